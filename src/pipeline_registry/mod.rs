//! PipelineRegistry - resolved servers, pipelines and topics
//!
//! ## Responsibilities
//!
//! - Resolve pipeline → server and topic → pipeline references
//! - Compile topic patterns and filter predicates
//! - Bind every pipeline to its inference backend through a `Connector`
//! - Report every invalid reference in a single configuration error
//!
//! A registry is immutable once built. Reloads build a fresh one.

use crate::ai_client::{CodeProjectAiClient, InferenceBackend};
use crate::config_store::AppConfig;
use crate::error::{Error, Result};
use crate::filter_engine::{FilterEngine, FilterPredicate};
use crate::frigate_client::{EventSource, FrigateClient};
use crate::models::PipelineKind;
use crate::topic_matcher::TopicMatcher;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Inference server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// One inference stage
pub struct Pipeline {
    pub name: String,
    pub kind: PipelineKind,
    pub server: Arc<Server>,
    pub model: Option<String>,
    pub threshold: f64,
    pub result_topic: Option<String>,
    pub filter: Option<FilterPredicate>,
    pub backend: Arc<dyn InferenceBackend>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("server", &self.server.name)
            .field("model", &self.model)
            .field("threshold", &self.threshold)
            .field("endpoint", &self.backend.endpoint())
            .finish()
    }
}

/// Subscription with its ordered pipeline chain
#[derive(Debug)]
pub struct Topic {
    pub subscribe: String,
    pub matcher: TopicMatcher,
    pub pipelines: Vec<Arc<Pipeline>>,
}

impl Topic {
    pub fn matches(&self, topic: &str) -> bool {
        self.matcher.test(topic)
    }
}

/// Builds the network-facing collaborators of a registry
pub trait Connector: Send + Sync {
    fn inference_backend(
        &self,
        kind: PipelineKind,
        server: &Server,
        model: Option<&str>,
        threshold: f64,
    ) -> Arc<dyn InferenceBackend>;

    fn event_source(&self, base_url: &str) -> Arc<dyn EventSource>;
}

/// Production connector: CodeProject.AI and Frigate over HTTP
#[derive(Clone)]
pub struct HttpConnector {
    inference: reqwest::Client,
    frigate: reqwest::Client,
}

impl HttpConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inference: CodeProjectAiClient::http_client()?,
            frigate: FrigateClient::http_client()?,
        })
    }
}

impl Connector for HttpConnector {
    fn inference_backend(
        &self,
        kind: PipelineKind,
        server: &Server,
        model: Option<&str>,
        threshold: f64,
    ) -> Arc<dyn InferenceBackend> {
        let client = self.inference.clone();
        match kind {
            PipelineKind::Object => Arc::new(CodeProjectAiClient::object(
                client,
                &server.host,
                server.port,
                model,
                threshold,
            )),
            PipelineKind::FaceDetect => Arc::new(CodeProjectAiClient::face_detector(
                client,
                &server.host,
                server.port,
                threshold,
            )),
            PipelineKind::FaceRecognize => Arc::new(CodeProjectAiClient::face_recognizer(
                client,
                &server.host,
                server.port,
                threshold,
            )),
        }
    }

    fn event_source(&self, base_url: &str) -> Arc<dyn EventSource> {
        Arc::new(FrigateClient::new(self.frigate.clone(), base_url))
    }
}

/// Immutable set of resolved servers, pipelines and topics
pub struct PipelineRegistry {
    servers: BTreeMap<String, Arc<Server>>,
    pipelines: BTreeMap<String, Arc<Pipeline>>,
    topics: Vec<Arc<Topic>>,
    event_source: Arc<dyn EventSource>,
}

impl PipelineRegistry {
    /// Resolve a validated configuration.
    ///
    /// Unknown servers, unknown pipelines, bad patterns and bad filters are
    /// all collected before failing.
    pub fn build(config: &AppConfig, connector: &dyn Connector) -> Result<Self> {
        let mut errors = Vec::new();
        let filters = FilterEngine::new();

        let servers: BTreeMap<String, Arc<Server>> = config
            .servers
            .iter()
            .map(|(name, server)| {
                let server = Server {
                    name: name.clone(),
                    host: server.host.clone(),
                    port: server.port,
                };
                (name.clone(), Arc::new(server))
            })
            .collect();

        let mut pipelines = BTreeMap::new();
        for (name, def) in &config.pipelines {
            let Some(server) = servers.get(&def.server) else {
                errors.push(format!(
                    "pipeline '{}' references unknown server '{}'",
                    name, def.server
                ));
                continue;
            };

            let filter = match &def.filter {
                Some(source) => match filters.compile(source) {
                    Ok(predicate) => Some(predicate),
                    Err(e) => {
                        errors.push(format!("pipeline '{}' filter: {}", name, e));
                        continue;
                    }
                },
                None => None,
            };

            let model = def.model.as_deref().filter(|m| !m.is_empty());
            let backend = connector.inference_backend(def.kind, server, model, def.threshold);

            pipelines.insert(
                name.clone(),
                Arc::new(Pipeline {
                    name: name.clone(),
                    kind: def.kind,
                    server: server.clone(),
                    model: model.map(str::to_string),
                    threshold: def.threshold,
                    result_topic: def.result_topic.clone(),
                    filter,
                    backend,
                }),
            );
        }

        let mut topics = Vec::with_capacity(config.topics.len());
        for def in &config.topics {
            let matcher = match TopicMatcher::with_policy(&def.subscribe, config.system_topics) {
                Ok(matcher) => Some(matcher),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            };

            let mut chain = Vec::with_capacity(def.pipelines.len());
            for name in &def.pipelines {
                match pipelines.get(name) {
                    Some(pipeline) => chain.push(Arc::clone(pipeline)),
                    // defined but dropped above: already reported
                    None if config.pipelines.contains_key(name) => {}
                    None => errors.push(format!(
                        "topic '{}' references unknown pipeline '{}'",
                        def.subscribe, name
                    )),
                }
            }

            if let Some(matcher) = matcher {
                topics.push(Arc::new(Topic {
                    subscribe: def.subscribe.clone(),
                    matcher,
                    pipelines: chain,
                }));
            }
        }

        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "Invalid references:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        let event_source = connector.event_source(&config.frigate.base_url());

        tracing::info!(
            servers = servers.len(),
            pipelines = pipelines.len(),
            topics = topics.len(),
            frigate = %event_source.base_url(),
            "Pipeline registry built"
        );

        Ok(Self {
            servers,
            pipelines,
            topics,
            event_source,
        })
    }

    pub fn pipeline(&self, name: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(name)
    }

    /// Topics in configuration order
    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn event_source(&self) -> &Arc<dyn EventSource> {
        &self.event_source
    }

    /// First topic, in configuration order, whose pattern matches `topic`
    pub fn find_topic(&self, topic: &str) -> Option<&Arc<Topic>> {
        self.topics.iter().find(|t| t.matches(topic))
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("servers", &self.servers.keys().collect::<Vec<_>>())
            .field("pipelines", &self.pipelines.keys().collect::<Vec<_>>())
            .field("topics", &self.topics)
            .field("event_source", &self.event_source.base_url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::RawPrediction;
    use crate::config_store::parse_config_str;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NullBackend(String);

    #[async_trait]
    impl InferenceBackend for NullBackend {
        fn endpoint(&self) -> &str {
            &self.0
        }

        async fn infer(&self, _image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
            Ok(Vec::new())
        }
    }

    struct NullSource(String);

    #[async_trait]
    impl EventSource for NullSource {
        fn base_url(&self) -> &str {
            &self.0
        }

        async fn snapshot(&self, _event_id: &str) -> Result<Arc<[u8]>> {
            Ok(Arc::from(vec![0u8]))
        }

        async fn set_sub_label(&self, _event_id: &str, _label: &str, _score: f64) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        bound: Mutex<Vec<(PipelineKind, String, Option<String>)>>,
    }

    impl Connector for RecordingConnector {
        fn inference_backend(
            &self,
            kind: PipelineKind,
            server: &Server,
            model: Option<&str>,
            _threshold: f64,
        ) -> Arc<dyn InferenceBackend> {
            self.bound
                .lock()
                .unwrap()
                .push((kind, server.name.clone(), model.map(str::to_string)));
            Arc::new(NullBackend(format!("{}:{}", server.host, server.port)))
        }

        fn event_source(&self, base_url: &str) -> Arc<dyn EventSource> {
            Arc::new(NullSource(base_url.to_string()))
        }
    }

    #[test]
    fn test_build_resolves_everything() {
        let config = parse_config_str(
            r#"
frigate: http://frigate:5000/
servers:
  cpai: {host: 10.0.0.2, port: 32168}
pipelines:
  cars: {server: cpai, model: ipcam-combined}
  faces: {server: cpai, type: face_recognize, filter: 'label == "person"'}
  unused: {server: cpai, type: face_detect}
topics:
  - subscribe: frigate/events
    pipelines: [cars, faces]
"#,
        )
        .unwrap();
        let connector = RecordingConnector::default();
        let registry = PipelineRegistry::build(&config, &connector).unwrap();

        assert_eq!(registry.server_count(), 1);
        assert_eq!(registry.pipeline_count(), 3);
        assert!(registry.pipeline("unused").is_some());
        assert_eq!(registry.event_source().base_url(), "http://frigate:5000");

        let topic = registry.find_topic("frigate/events").unwrap();
        let names: Vec<&str> = topic.pipelines.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["cars", "faces"]);
        assert!(topic.pipelines[1].filter.is_some());
        assert_eq!(topic.pipelines[0].backend.endpoint(), "10.0.0.2:32168");

        let bound = connector.bound.lock().unwrap();
        assert!(bound.contains(&(
            PipelineKind::Object,
            "cpai".to_string(),
            Some("ipcam-combined".to_string())
        )));
        assert!(bound.contains(&(PipelineKind::FaceDetect, "cpai".to_string(), None)));
    }

    #[test]
    fn test_build_enumerates_every_violation() {
        let config = parse_config_str(
            r#"
frigate: http://frigate:5000
servers:
  cpai: {host: 10.0.0.2, port: 32168}
pipelines:
  cars: {server: missing_server}
  people: {server: cpai, filter: 'label =='}
  ok: {server: cpai}
topics:
  - subscribe: frigate/events
    pipelines: [ok, ghost]
  - subscribe: "bad/#/pattern"
    pipelines: [ok]
"#,
        )
        .unwrap();

        let err = PipelineRegistry::build(&config, &RecordingConnector::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown server 'missing_server'"), "{}", err);
        assert!(err.contains("pipeline 'people' filter"), "{}", err);
        assert!(err.contains("unknown pipeline 'ghost'"), "{}", err);
        assert!(err.contains("bad/#/pattern"), "{}", err);
    }

    #[test]
    fn test_first_matching_topic_wins() {
        let config = parse_config_str(
            r#"
frigate: http://frigate:5000
servers:
  cpai: {host: 10.0.0.2, port: 32168}
pipelines:
  a: {server: cpai}
  b: {server: cpai}
topics:
  - subscribe: frigate/+/events
    pipelines: a
  - subscribe: frigate/#
    pipelines: b
"#,
        )
        .unwrap();
        let registry = PipelineRegistry::build(&config, &RecordingConnector::default()).unwrap();

        let first = registry.find_topic("frigate/front/events").unwrap();
        assert_eq!(first.subscribe, "frigate/+/events");
        let second = registry.find_topic("frigate/other").unwrap();
        assert_eq!(second.subscribe, "frigate/#");
        assert!(registry.find_topic("zigbee/x").is_none());
    }
}
