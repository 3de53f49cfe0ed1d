//! FilterEngine - per-pipeline event predicates
//!
//! Pipelines may carry a filter expression that decides whether the stage runs
//! for a given event. Expressions are Rhai, evaluated against the event's
//! field map:
//!
//! - every top-level field is a variable (`label == "person"`,
//!   `score > 0.75`, `"yard" in current_zones`)
//! - the whole event is also available as `event` (`event.camera == "porch"`)
//! - fields that are not valid identifiers are only reachable through `event`
//! - a field the event does not carry reads as `()`, so `label == "person"`
//!   is simply false for an event without a label
//!
//! The expression must evaluate to a boolean.

use crate::error::{Error, Result};
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::Arc;

/// Shared Rhai engine used to compile every pipeline filter
#[derive(Clone)]
pub struct FilterEngine {
    engine: Arc<Engine>,
}

impl FilterEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Safety limits; filters run on every matched message
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        // Unknown variables are absent event fields
        engine.on_var(|name, _index, context| {
            if context.scope().contains(name) {
                Ok(None)
            } else {
                Ok(Some(Dynamic::UNIT))
            }
        });
    }

    /// Compile a filter expression
    pub fn compile(&self, source: &str) -> Result<FilterPredicate> {
        let ast = self
            .engine
            .compile_expression(source)
            .map_err(|e| Error::Config(format!("invalid filter '{}': {}", source, e)))?;

        Ok(FilterPredicate {
            source: source.to_string(),
            ast: Arc::new(ast),
            engine: self.engine.clone(),
        })
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled filter expression
#[derive(Clone)]
pub struct FilterPredicate {
    source: String,
    ast: Arc<AST>,
    engine: Arc<Engine>,
}

impl std::fmt::Debug for FilterPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPredicate")
            .field("source", &self.source)
            .finish()
    }
}

impl FilterPredicate {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against an event field map
    pub fn evaluate(&self, fields: &serde_json::Map<String, serde_json::Value>) -> Result<bool> {
        let mut scope = Scope::new();

        for (name, value) in fields {
            if is_identifier(name) {
                scope.push_dynamic(name.as_str(), to_dynamic(value)?);
            }
        }
        let event = serde_json::Value::Object(fields.clone());
        scope.push_dynamic("event", to_dynamic(&event)?);

        self.engine
            .eval_ast_with_scope::<bool>(&mut scope, &self.ast)
            .map_err(|e| Error::Filter(format!("filter '{}' failed: {}", self.source, e)))
    }
}

fn to_dynamic(value: &serde_json::Value) -> Result<Dynamic> {
    rhai::serde::to_dynamic(value)
        .map_err(|e| Error::Filter(format!("cannot expose event field to filter: {}", e)))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name != "event" && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
