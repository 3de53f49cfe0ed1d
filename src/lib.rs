//! CPAI ExHook Library
//!
//! MQTT broker hook that enriches Frigate events with CodeProject.AI
//! inferences
//!
//! ## Architecture (12 Components)
//!
//! 1. TopicMatcher - MQTT filter matching (`+`, `#`, `$` policy)
//! 2. FilterEngine - Rhai predicates gating pipelines
//! 3. AIClient - CodeProject.AI vision adapter and inference pool
//! 4. FrigateClient - Snapshot fetch and sub-label updates
//! 5. PipelineRegistry - Resolved servers, pipelines and topics
//! 6. PipelineExecutor - One stage against one event
//! 7. TopicProcessor - Ordered stage chain with short-circuit
//! 8. ProcessCoordinator - Payload handling and snapshot swap
//! 9. HookProvider - Broker `message.publish` decision
//! 10. ConfigStore - YAML load, validation and reload watcher
//! 11. WebAPI - Hook transport, health, status, reload
//! 12. Models - Event and prediction types
//!
//! ## Design Principles
//!
//! - Configuration is an immutable snapshot swapped as a whole
//! - Event enrichment is additive: scores only grow, sub-labels only improve
//! - Anything that cannot be enriched passes through unchanged

pub mod ai_client;
pub mod config_store;
pub mod error;
pub mod filter_engine;
pub mod frigate_client;
pub mod hook_provider;
pub mod models;
pub mod pipeline_executor;
pub mod pipeline_registry;
pub mod process_coordinator;
pub mod state;
pub mod topic_matcher;
pub mod topic_processor;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
