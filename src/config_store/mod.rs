//! ConfigStore - YAML configuration file
//!
//! ## Responsibilities
//!
//! - Read the config file, substitute `${VAR}` references and parse it
//! - Semantic validation with every violation reported at once
//! - Track the file modification time for the reload watcher
//!
//! ## Design Principles
//!
//! - The file is the only source of configuration
//! - A loaded `AppConfig` is immutable; reloads build a new one

mod parser;
mod types;
mod validation;
mod watcher;

pub use parser::{parse_config_str, substitute_env_vars};
pub use types::*;
pub use validation::{validate_config, validate_publish_topic, validate_subscribe_topic};
pub use watcher::ConfigWatcher;

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Config file handle
pub struct ConfigStore {
    path: PathBuf,
    /// Modification time seen by the last load attempt
    last_modified: RwLock<Option<SystemTime>>,
}

impl ConfigStore {
    /// Create new ConfigStore for `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, parse and validate the file.
    ///
    /// The modification time is recorded as soon as the file has been read,
    /// so an invalid file is not retried until it changes again.
    pub async fn load(&self) -> Result<AppConfig> {
        let modified = self.modified().await?;
        let content = tokio::fs::read_to_string(&self.path).await?;
        *self.last_modified.write().await = Some(modified);

        let config = parse_config_str(&content)?;
        validate_config(&config)?;

        tracing::debug!(
            path = %self.path.display(),
            servers = config.servers.len(),
            pipelines = config.pipelines.len(),
            topics = config.topics.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Whether the file changed since the last load attempt
    pub async fn has_changed(&self) -> Result<bool> {
        let modified = self.modified().await?;
        Ok(*self.last_modified.read().await != Some(modified))
    }

    async fn modified(&self) -> Result<SystemTime> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        Ok(metadata.modified()?)
    }
}
