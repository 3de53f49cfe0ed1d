//! ConfigWatcher - polls the config file and installs new snapshots
//!
//! A reload that fails at any step is logged and leaves the active snapshot
//! in place.

use super::ConfigStore;
use crate::error::Result;
use crate::pipeline_registry::{Connector, PipelineRegistry};
use crate::process_coordinator::ProcessCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;

/// Background config reloader
pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    coordinator: Arc<ProcessCoordinator>,
    connector: Arc<dyn Connector>,
    poll_interval: Duration,
    running: Arc<RwLock<bool>>,
    /// Serializes polled and manual reloads
    reload_lock: Mutex<()>,
}

impl ConfigWatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        coordinator: Arc<ProcessCoordinator>,
        connector: Arc<dyn Connector>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            coordinator,
            connector,
            poll_interval,
            running: Arc::new(RwLock::new(false)),
            reload_lock: Mutex::new(()),
        }
    }

    /// Start the polling loop
    pub async fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Config watcher already running");
                return;
            }
            *running = true;
        }

        tracing::info!(
            path = %self.store.path().display(),
            interval_secs = self.poll_interval.as_secs(),
            "Starting config watcher"
        );

        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(watcher.poll_interval);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !*watcher.running.read().await {
                    tracing::info!("Config watcher stopped");
                    break;
                }

                if let Err(e) = watcher.check_once().await {
                    tracing::error!(error = %e, "Config reload failed, keeping active snapshot");
                }
            }
        });
    }

    /// Stop the polling loop after its current tick
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Reload if the file changed; returns the new generation when one was installed
    pub async fn check_once(&self) -> Result<Option<u64>> {
        if !self.store.has_changed().await? {
            return Ok(None);
        }
        tracing::info!(path = %self.store.path().display(), "Config file changed");
        self.reload().await.map(Some)
    }

    /// Load, build and install unconditionally; returns the new generation
    pub async fn reload(&self) -> Result<u64> {
        let _reloading = self.reload_lock.lock().await;

        let config = self.store.load().await?;
        let registry = PipelineRegistry::build(&config, self.connector.as_ref())?;
        let generation = self.coordinator.install(registry, config.processing).await;

        tracing::info!(
            generation = generation,
            topics = config.topics.len(),
            pipelines = config.pipelines.len(),
            "Config reloaded"
        );
        Ok(generation)
    }
}
