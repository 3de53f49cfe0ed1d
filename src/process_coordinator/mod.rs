//! ProcessCoordinator - hook payload to enriched payload
//!
//! ## Responsibilities
//!
//! - Own the active configuration snapshot and swap it atomically on reload
//! - Resolve topics through a per-snapshot cache
//! - Fetch the event snapshot and run the matched topic's chain
//! - Re-serialize the payload with the enriched `after` event
//!
//! ## Concurrency
//!
//! The snapshot lives behind one `tokio::sync::Mutex<Arc<ActiveConfig>>`.
//! In `serialized` mode a message holds that lock for its whole lifetime, so
//! messages run one at a time and a reload waits for the current message. In
//! `concurrent` mode only the `Arc` clone happens under the lock. Either way a
//! message sees exactly one snapshot.

use crate::ai_client::InferencePool;
use crate::models::Event;
use crate::pipeline_executor::PipelineExecutor;
use crate::pipeline_registry::{PipelineRegistry, Topic};
use crate::topic_processor::TopicProcessor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// How hook messages share the active snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One message at a time
    #[default]
    Serialized,
    /// Messages run in parallel, each pinned to the snapshot it started with
    Concurrent,
}

/// Installed configuration snapshot
pub struct ActiveConfig {
    registry: PipelineRegistry,
    mode: ProcessingMode,
    /// topic string -> first matching topic
    topic_cache: std::sync::RwLock<HashMap<String, Arc<Topic>>>,
    generation: u64,
    installed_at: DateTime<Utc>,
}

impl ActiveConfig {
    fn new(registry: PipelineRegistry, mode: ProcessingMode, generation: u64) -> Self {
        Self {
            registry,
            mode,
            topic_cache: std::sync::RwLock::new(HashMap::new()),
            generation,
            installed_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    pub fn cached_topics(&self) -> usize {
        self.topic_cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Cached lookup; on a miss the first matching topic is cached
    fn resolve_topic(&self, topic: &str) -> Option<Arc<Topic>> {
        if let Ok(cache) = self.topic_cache.read() {
            if let Some(hit) = cache.get(topic) {
                return Some(hit.clone());
            }
        }

        let winner = self.registry.find_topic(topic)?.clone();
        if let Ok(mut cache) = self.topic_cache.write() {
            cache.insert(topic.to_string(), winner.clone());
        }
        Some(winner)
    }
}

/// Enriched payload to hand back to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedMessage {
    pub payload: Vec<u8>,
    /// Result topic override of the last stage that declared one
    pub topic: Option<String>,
}

/// Message counters
#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub generation: u64,
    pub installed_at: DateTime<Utc>,
    pub mode: ProcessingMode,
    pub servers: usize,
    pub pipelines: usize,
    pub topics: usize,
    pub cached_topics: usize,
    pub event_source: String,
    pub pool_size: usize,
    pub pool_available: usize,
    pub processed: u64,
    pub ignored: u64,
    pub failed: u64,
}

/// Coordinates message processing against the active snapshot
pub struct ProcessCoordinator {
    active: Mutex<Arc<ActiveConfig>>,
    /// Copy of the installed snapshot for observers that must not queue on `active`
    published: std::sync::RwLock<Arc<ActiveConfig>>,
    executor: PipelineExecutor,
    generation: AtomicU64,
    counters: Counters,
}

impl ProcessCoordinator {
    /// Create new coordinator with its first snapshot (generation 1)
    pub fn new(registry: PipelineRegistry, mode: ProcessingMode, pool: Arc<InferencePool>) -> Self {
        let active = Arc::new(ActiveConfig::new(registry, mode, 1));
        Self {
            active: Mutex::new(active.clone()),
            published: std::sync::RwLock::new(active),
            executor: PipelineExecutor::new(pool),
            generation: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Replace the active snapshot; returns its generation.
    ///
    /// Waits for the in-flight message in serialized mode.
    pub async fn install(&self, registry: PipelineRegistry, mode: ProcessingMode) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Arc::new(ActiveConfig::new(registry, mode, generation));

        let mut active = self.active.lock().await;
        *active = next.clone();
        if let Ok(mut published) = self.published.write() {
            *published = next;
        }
        drop(active);

        tracing::info!(generation = generation, mode = ?mode, "Config snapshot installed");
        generation
    }

    /// Snapshot currently installed
    pub fn current(&self) -> Option<Arc<ActiveConfig>> {
        self.published.read().ok().map(|active| active.clone())
    }

    pub fn status(&self) -> Option<CoordinatorStatus> {
        let active = self.current()?;
        let registry = active.registry();
        let pool = self.executor.pool();
        Some(CoordinatorStatus {
            generation: active.generation(),
            installed_at: active.installed_at(),
            mode: active.mode(),
            servers: registry.server_count(),
            pipelines: registry.pipeline_count(),
            topics: registry.topics().len(),
            cached_topics: active.cached_topics(),
            event_source: registry.event_source().base_url().to_string(),
            pool_size: pool.size(),
            pool_available: pool.available(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        })
    }

    /// Process one published message.
    ///
    /// `None` means the message passes through unchanged.
    pub async fn process_message(&self, topic: &str, payload: &[u8]) -> Option<ProcessedMessage> {
        let guard = self.active.lock().await;
        let active = Arc::clone(&guard);
        let _serial = match active.mode() {
            ProcessingMode::Serialized => Some(guard),
            ProcessingMode::Concurrent => {
                drop(guard);
                None
            }
        };

        let result = self.handle(&active, topic, payload).await;
        let counter = match &result {
            Outcome::Enriched(_) => &self.counters.processed,
            Outcome::Ignored => &self.counters.ignored,
            Outcome::Failed => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match result {
            Outcome::Enriched(message) => Some(message),
            Outcome::Ignored | Outcome::Failed => None,
        }
    }

    async fn handle(&self, active: &ActiveConfig, topic: &str, payload: &[u8]) -> Outcome {
        let mut root: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(topic = %topic, error = %e, "Payload is not JSON");
                return Outcome::Ignored;
            }
        };

        let Some(after) = root.get("after").filter(|after| !after.is_null()) else {
            tracing::debug!(topic = %topic, "Payload has no 'after' event");
            return Outcome::Ignored;
        };

        let event: Event = match serde_json::from_value(after.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(topic = %topic, error = %e, "Unusable 'after' event");
                return Outcome::Ignored;
            }
        };

        let Some(matched) = active.resolve_topic(topic) else {
            tracing::debug!(topic = %topic, "No topic matched");
            return Outcome::Ignored;
        };

        let event_source = active.registry().event_source();
        let snapshot = match event_source.snapshot(&event.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    topic = %topic,
                    event_id = %event.id,
                    error = %e,
                    "Snapshot fetch failed"
                );
                return Outcome::Failed;
            }
        };

        let event_id = event.id.clone();
        let processor = TopicProcessor::new(&self.executor, event_source.as_ref());
        let outcome = match processor.process(&matched, event, snapshot).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    topic = %topic,
                    event_id = %event_id,
                    partial = e.partial_inferences().len(),
                    error = %e,
                    "Pipeline chain failed"
                );
                return Outcome::Failed;
            }
        };

        if outcome.is_empty() {
            tracing::debug!(topic = %topic, event_id = %event_id, "Chain produced no inference");
            return Outcome::Ignored;
        }

        let enriched = match serde_json::to_value(&outcome.event) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(
                    topic = %topic,
                    event_id = %event_id,
                    error = %e,
                    "Event serialization failed"
                );
                return Outcome::Failed;
            }
        };
        root["after"] = enriched;

        match serde_json::to_vec(&root) {
            Ok(payload) => {
                tracing::info!(
                    topic = %topic,
                    event_id = %event_id,
                    pattern = %matched.subscribe,
                    inferences = outcome.inferences.len(),
                    short_circuited = outcome.short_circuited,
                    "Message enriched"
                );
                Outcome::Enriched(ProcessedMessage {
                    payload,
                    topic: outcome.result_topic,
                })
            }
            Err(e) => {
                tracing::error!(
                    topic = %topic,
                    event_id = %event_id,
                    error = %e,
                    "Payload serialization failed"
                );
                Outcome::Failed
            }
        }
    }
}

enum Outcome {
    Enriched(ProcessedMessage),
    Ignored,
    Failed,
}
