//! TopicMatcher - MQTT wildcard subscription matching
//!
//! ## Responsibilities
//!
//! - Compile a subscription filter (`+` single level, `#` multi level) into an
//!   anchored regular expression
//! - Test published topic names against it
//!
//! Matchers are immutable and cheap to clone; the coordinator caches the
//! winning topic per published topic string.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

const SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";
const SYSTEM_PREFIX: char = '$';

/// How a `$`-prefixed topic relates to a filter that does not start with `$`
/// (and the other way round).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemTopicPolicy {
    /// System topics only match system filters
    #[default]
    Isolate,
    /// Historical behavior: a mismatched `$` prefix counts as a match
    Legacy,
}

impl SystemTopicPolicy {
    /// Outcome when exactly one side carries the `$` prefix
    fn mismatched_prefix_matches(self) -> bool {
        self == SystemTopicPolicy::Legacy
    }
}

/// Compiled subscription filter
#[derive(Debug, Clone)]
pub struct TopicMatcher {
    pattern: String,
    regex: Regex,
    policy: SystemTopicPolicy,
}

impl TopicMatcher {
    /// Compile with the default (`isolate`) system-topic policy
    pub fn compile(pattern: &str) -> Result<Self> {
        Self::with_policy(pattern, SystemTopicPolicy::default())
    }

    pub fn with_policy(pattern: &str, policy: SystemTopicPolicy) -> Result<Self> {
        let source = to_regex(pattern)?;
        let regex = Regex::new(&source).map_err(|e| {
            Error::Config(format!("topic pattern '{}' failed to compile: {}", pattern, e))
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            policy,
        })
    }

    /// Original subscription filter
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn policy(&self) -> SystemTopicPolicy {
        self.policy
    }

    /// Test a published topic name
    pub fn test(&self, topic: &str) -> bool {
        if topic.trim().is_empty() {
            return false;
        }
        if topic == self.pattern {
            return true;
        }
        let topic_is_system = topic.starts_with(SYSTEM_PREFIX);
        let pattern_is_system = self.pattern.starts_with(SYSTEM_PREFIX);
        if topic_is_system != pattern_is_system {
            return self.policy.mismatched_prefix_matches();
        }
        self.regex.is_match(topic)
    }
}

/// Validate a subscription filter and translate it to an anchored regex
fn to_regex(pattern: &str) -> Result<String> {
    if pattern.is_empty() {
        return Err(Error::Config("topic pattern must not be empty".to_string()));
    }

    let levels: Vec<&str> = pattern.split(SEPARATOR).collect();
    let last = levels.len() - 1;
    let mut parts: Vec<String> = Vec::with_capacity(levels.len());
    let mut multi_level_suffix = false;

    for (i, level) in levels.iter().enumerate() {
        match *level {
            SINGLE_LEVEL => parts.push("[^/]+".to_string()),
            MULTI_LEVEL if i == last => multi_level_suffix = true,
            MULTI_LEVEL => {
                return Err(Error::Config(format!(
                    "multi-level wildcard must be the last level in '{}'",
                    pattern
                )))
            }
            literal if literal.contains(SINGLE_LEVEL) => {
                return Err(Error::Config(format!(
                    "single-level wildcard must occupy an entire level in '{}'",
                    pattern
                )))
            }
            literal if literal.contains(MULTI_LEVEL) => {
                return Err(Error::Config(format!(
                    "multi-level wildcard must occupy an entire level in '{}'",
                    pattern
                )))
            }
            literal => parts.push(regex::escape(literal)),
        }
    }

    let body = parts.join("/");
    let source = match (multi_level_suffix, parts.is_empty()) {
        // "#" alone
        (true, true) => ".*".to_string(),
        // "a/#" matches "a" as well as everything below it
        (true, false) => format!("{}(?:/.*)?", body),
        (false, _) => body,
    };

    Ok(format!("^{}$", source))
}
