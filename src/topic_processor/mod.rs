//! TopicProcessor - ordered pipeline chain for one matched topic
//!
//! Stages run in configuration order. The first stage that produces nothing
//! ends the chain; a failing stage ends it with an error carrying the
//! inferences completed so far.

use crate::error::{Error, Result};
use crate::frigate_client::EventSource;
use crate::models::{Event, Inference};
use crate::pipeline_executor::PipelineExecutor;
use crate::pipeline_registry::Topic;
use std::sync::Arc;

/// Result of running a topic's chain
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub event: Event,
    pub inferences: Vec<Inference>,
    /// A stage produced nothing before the end of the chain
    pub short_circuited: bool,
    /// `result_topic` of the last executed stage that declares one
    pub result_topic: Option<String>,
}

impl ChainOutcome {
    pub fn is_empty(&self) -> bool {
        self.inferences.is_empty()
    }
}

/// Drives a topic's pipelines through the executor
pub struct TopicProcessor<'a> {
    executor: &'a PipelineExecutor,
    event_source: &'a dyn EventSource,
}

impl<'a> TopicProcessor<'a> {
    pub fn new(executor: &'a PipelineExecutor, event_source: &'a dyn EventSource) -> Self {
        Self {
            executor,
            event_source,
        }
    }

    pub async fn process(
        &self,
        topic: &Topic,
        mut event: Event,
        snapshot: Arc<[u8]>,
    ) -> Result<ChainOutcome> {
        let mut inferences = Vec::with_capacity(topic.pipelines.len());
        let mut result_topic = None;
        let mut short_circuited = false;

        for (stage, pipeline) in topic.pipelines.iter().enumerate() {
            let result = self
                .executor
                .infer(pipeline, &mut event, snapshot.clone(), self.event_source)
                .await;

            match result {
                Ok(Some(inference)) => {
                    if pipeline.result_topic.is_some() {
                        result_topic = pipeline.result_topic.clone();
                    }
                    inferences.push(inference);
                }
                Ok(None) => {
                    short_circuited = stage + 1 < topic.pipelines.len();
                    if short_circuited {
                        tracing::debug!(
                            topic = %topic.subscribe,
                            event_id = %event.id,
                            pipeline = %pipeline.name,
                            skipped = topic.pipelines.len() - stage - 1,
                            "Chain stopped"
                        );
                    }
                    break;
                }
                Err(e) => {
                    return Err(Error::InferenceChain {
                        event_id: event.id.clone(),
                        inferences,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(ChainOutcome {
            event,
            inferences,
            short_circuited,
            result_topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::{InferenceBackend, InferencePool, RawPrediction};
    use crate::models::PipelineKind;
    use crate::pipeline_registry::{Pipeline, Server};
    use crate::topic_matcher::TopicMatcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Hit(&'static str, f64),
        Miss,
        Fail,
    }

    struct ScriptedBackend {
        reply: Reply,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn endpoint(&self) -> &str {
            "scripted"
        }

        async fn infer(&self, _image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Hit(label, confidence) => Ok(vec![RawPrediction {
                    confidence,
                    label: Some(label.to_string()),
                    x_min: 0,
                    y_min: 0,
                    x_max: 10,
                    y_max: 10,
                }]),
                Reply::Miss => Ok(Vec::new()),
                Reply::Fail => Err(Error::Api("server down".to_string())),
            }
        }
    }

    struct NoopSource;

    #[async_trait]
    impl EventSource for NoopSource {
        fn base_url(&self) -> &str {
            "noop"
        }

        async fn snapshot(&self, _event_id: &str) -> Result<Arc<[u8]>> {
            Ok(Arc::from(vec![0u8]))
        }

        async fn set_sub_label(&self, _event_id: &str, _label: &str, _score: f64) -> Result<()> {
            Ok(())
        }
    }

    fn stage(
        name: &str,
        reply: Reply,
        result_topic: Option<&str>,
    ) -> (Arc<Pipeline>, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend {
            reply,
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(Pipeline {
            name: name.to_string(),
            kind: PipelineKind::Object,
            server: Arc::new(Server {
                name: "cpai".to_string(),
                host: "h".to_string(),
                port: 1,
            }),
            model: None,
            threshold: 0.5,
            result_topic: result_topic.map(str::to_string),
            filter: None,
            backend: backend.clone(),
        });
        (pipeline, backend)
    }

    fn topic(pipelines: Vec<Arc<Pipeline>>) -> Topic {
        Topic {
            subscribe: "frigate/events".to_string(),
            matcher: TopicMatcher::compile("frigate/events").unwrap(),
            pipelines,
        }
    }

    fn event() -> Event {
        serde_json::from_value(serde_json::json!({"id": "ev1", "camera": "driveway"})).unwrap()
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let (a, _) = stage("cars", Reply::Hit("car", 0.9), Some("frigate/cars"));
        let (b, _) = stage("plates", Reply::Hit("plate", 0.8), None);
        let executor = PipelineExecutor::new(Arc::new(InferencePool::new(1)));
        let processor = TopicProcessor::new(&executor, &NoopSource);

        let outcome = processor
            .process(&topic(vec![a, b]), event(), Arc::from(vec![1u8]))
            .await
            .unwrap();

        let names: Vec<&str> = outcome.inferences.iter().map(|i| i.pipeline.as_str()).collect();
        assert_eq!(names, vec!["cars", "plates"]);
        assert!(!outcome.short_circuited);
        assert_eq!(outcome.result_topic.as_deref(), Some("frigate/cars"));
        assert_eq!(outcome.event.attributes.len(), 2);
    }

    #[tokio::test]
    async fn test_chain_short_circuits() {
        let (a, _) = stage("cars", Reply::Hit("car", 0.9), None);
        let (b, _) = stage("faces", Reply::Miss, None);
        let (c, c_backend) = stage("plates", Reply::Hit("plate", 0.8), None);
        let executor = PipelineExecutor::new(Arc::new(InferencePool::new(1)));
        let processor = TopicProcessor::new(&executor, &NoopSource);

        let outcome = processor
            .process(&topic(vec![a, b, c]), event(), Arc::from(vec![1u8]))
            .await
            .unwrap();

        assert_eq!(outcome.inferences.len(), 1);
        assert!(outcome.short_circuited);
        assert_eq!(c_backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_carries_partial_inferences() {
        let (a, _) = stage("cars", Reply::Hit("car", 0.9), None);
        let (b, _) = stage("faces", Reply::Fail, None);
        let (c, c_backend) = stage("plates", Reply::Hit("plate", 0.8), None);
        let executor = PipelineExecutor::new(Arc::new(InferencePool::new(1)));
        let processor = TopicProcessor::new(&executor, &NoopSource);

        let err = processor
            .process(&topic(vec![a, b, c]), event(), Arc::from(vec![1u8]))
            .await
            .unwrap_err();

        match &err {
            Error::InferenceChain {
                event_id,
                inferences,
                source,
            } => {
                assert_eq!(event_id, "ev1");
                assert_eq!(inferences.len(), 1);
                assert_eq!(inferences[0].pipeline, "cars");
                assert!(matches!(**source, Error::Api(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.partial_inferences().len(), 1);
        assert_eq!(c_backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_stage_miss_is_empty() {
        let (a, _) = stage("cars", Reply::Miss, None);
        let executor = PipelineExecutor::new(Arc::new(InferencePool::new(1)));
        let processor = TopicProcessor::new(&executor, &NoopSource);

        let outcome = processor
            .process(&topic(vec![a]), event(), Arc::from(vec![1u8]))
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(!outcome.short_circuited);
    }
}
