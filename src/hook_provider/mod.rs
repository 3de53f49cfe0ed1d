//! HookProvider - broker `message.publish` hook
//!
//! Turns a published message into a pass/replace decision. Anything that is
//! not an enrichable event passes through untouched.

use crate::process_coordinator::ProcessCoordinator;
use std::sync::Arc;

/// Verdict returned to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Deliver the original message
    Ignore,
    /// Replace the payload, and optionally the topic
    Continue {
        payload: Vec<u8>,
        topic: Option<String>,
    },
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Ignore => "ignore",
            Decision::Continue { .. } => "continue",
        }
    }
}

/// Hook entry point backed by the coordinator
#[derive(Clone)]
pub struct HookProvider {
    coordinator: Arc<ProcessCoordinator>,
}

impl HookProvider {
    pub fn new(coordinator: Arc<ProcessCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn on_message_publish(&self, topic: &str, payload: &[u8]) -> Decision {
        match self.coordinator.process_message(topic, payload).await {
            Some(message) => Decision::Continue {
                payload: message.payload,
                topic: message.topic,
            },
            None => Decision::Ignore,
        }
    }
}
