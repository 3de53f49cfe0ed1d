//! ConfigStore data types
//!
//! YAML file structures for the bind address, the event source, inference
//! servers, pipelines and topic subscriptions

use crate::models::PipelineKind;
use crate::process_coordinator::ProcessingMode;
use crate::topic_matcher::SystemTopicPolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_BIND: &str = "0.0.0.0:9000";
pub const DEFAULT_THREADS: usize = 10;
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bind: BindAddress,

    /// Inference worker pool size
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,

    #[serde(default)]
    pub processing: ProcessingMode,

    #[serde(default)]
    pub system_topics: SystemTopicPolicy,

    pub frigate: FrigateAddress,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,

    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub topics: Vec<TopicConfig>,
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_reload_interval() -> u64 {
    DEFAULT_RELOAD_INTERVAL_SECS
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Listen address, either `"a.b.c.d:port"` or `{ip, port}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindAddress {
    Text(String),
    Parts { ip: String, port: u16 },
}

impl BindAddress {
    pub fn to_addr(&self) -> String {
        match self {
            BindAddress::Text(text) => text.trim().to_string(),
            BindAddress::Parts { ip, port } => format!("{}:{}", ip.trim(), port),
        }
    }
}

impl Default for BindAddress {
    fn default() -> Self {
        BindAddress::Text(DEFAULT_BIND.to_string())
    }
}

/// Frigate base address, either a URL or `{host, port}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrigateAddress {
    Url(String),
    Parts { host: String, port: u16 },
}

impl FrigateAddress {
    /// Base URL without trailing slash
    pub fn base_url(&self) -> String {
        match self {
            FrigateAddress::Url(url) => url.trim().trim_end_matches('/').to_string(),
            FrigateAddress::Parts { host, port } => format!("http://{}:{}", host.trim(), port),
        }
    }
}

/// CodeProject.AI server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub server: String,

    #[serde(rename = "type", default)]
    pub kind: PipelineKind,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub result_topic: Option<String>,

    /// Rhai boolean expression evaluated against the event fields
    #[serde(default)]
    pub filter: Option<String>,
}

/// Topic subscription and its ordered pipeline chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(alias = "topic")]
    pub subscribe: String,

    #[serde(deserialize_with = "one_or_many")]
    pub pipelines: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Accept either a single value or a list
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::<T>::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
