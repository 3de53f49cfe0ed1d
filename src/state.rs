//! Application state
//!
//! Holds the shared components handed to the web API

use crate::config_store::ConfigWatcher;
use crate::hook_provider::HookProvider;
use crate::process_coordinator::ProcessCoordinator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Broker hook entry point
    pub hook: HookProvider,
    /// Active snapshot owner
    pub coordinator: Arc<ProcessCoordinator>,
    /// Config reloader (manual reload endpoint)
    pub watcher: Arc<ConfigWatcher>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: Arc<ProcessCoordinator>, watcher: Arc<ConfigWatcher>) -> Self {
        Self {
            hook: HookProvider::new(coordinator.clone()),
            coordinator,
            watcher,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_sec(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
