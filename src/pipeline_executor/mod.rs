//! PipelineExecutor - one inference stage against one event
//!
//! ## Responsibilities
//!
//! - Filter gate: a false predicate skips the stage without touching the event
//! - Dispatch the snapshot to the pipeline's backend on the `InferencePool`
//! - Normalize labels and apply the pipeline threshold
//! - Merge the result into the event (sub-label, attributes, current_attributes)
//!
//! Event mutation only ever adds information: the sub-label is replaced only
//! by a strictly more confident one and attribute scores only grow.

use crate::ai_client::InferencePool;
use crate::error::Result;
use crate::frigate_client::EventSource;
use crate::models::{Event, Inference, Prediction};
use crate::pipeline_registry::Pipeline;
use std::sync::Arc;

/// Runs pipelines against events
pub struct PipelineExecutor {
    pool: Arc<InferencePool>,
}

impl PipelineExecutor {
    pub fn new(pool: Arc<InferencePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<InferencePool> {
        &self.pool
    }

    /// Run `pipeline` on `snapshot`, merging the result into `event`.
    ///
    /// `Ok(None)` means the stage produced nothing: the filter rejected the
    /// event or no prediction passed the threshold.
    pub async fn infer(
        &self,
        pipeline: &Pipeline,
        event: &mut Event,
        snapshot: Arc<[u8]>,
        event_source: &dyn EventSource,
    ) -> Result<Option<Inference>> {
        if let Some(filter) = &pipeline.filter {
            if !filter.evaluate(&event.fields()?)? {
                tracing::debug!(
                    pipeline = %pipeline.name,
                    event_id = %event.id,
                    filter = %filter.source(),
                    "Filter rejected event"
                );
                return Ok(None);
            }
        }

        let raw = self.pool.run(pipeline.backend.clone(), snapshot).await?;
        let predictions = normalize(pipeline, raw);

        if predictions.is_empty() {
            tracing::debug!(
                pipeline = %pipeline.name,
                event_id = %event.id,
                "No predictions"
            );
            return Ok(None);
        }

        let inference = Inference {
            pipeline: pipeline.name.clone(),
            predictions,
        };

        if let Some(top) = inference.top_prediction() {
            if event.should_replace_sub_label(top.confidence) {
                event_source
                    .set_sub_label(&event.id, &top.label, top.confidence)
                    .await?;
                event.set_sub_label(&top.label, top.confidence);
            }
        }
        event.merge_attributes(&inference.predictions);
        event.merge_current_attributes(&inference.predictions);

        tracing::info!(
            pipeline = %pipeline.name,
            event_id = %event.id,
            camera = %event.camera,
            predictions = inference.predictions.len(),
            "Pipeline produced predictions"
        );

        Ok(Some(inference))
    }
}

/// Apply label fallbacks and the pipeline threshold, keeping backend order
fn normalize(
    pipeline: &Pipeline,
    raw: Vec<crate::ai_client::RawPrediction>,
) -> Vec<Prediction> {
    raw.into_iter()
        .filter(|p| p.confidence >= pipeline.threshold)
        .map(|p| {
            let mut prediction = p.into_prediction(pipeline.kind.fallback_label());
            if let Some(label) = pipeline.kind.forced_label() {
                prediction.label = label.to_string();
            }
            prediction
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::{InferenceBackend, RawPrediction};
    use crate::error::Error;
    use crate::filter_engine::FilterEngine;
    use crate::models::{BoundingBox, PipelineKind, SubLabel};
    use crate::pipeline_registry::Server;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedBackend {
        predictions: Vec<RawPrediction>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for FixedBackend {
        fn endpoint(&self) -> &str {
            "fixed"
        }

        async fn infer(&self, _image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.predictions.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSource {
        sub_labels: Mutex<Vec<(String, String, f64)>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSource for RecordingSource {
        fn base_url(&self) -> &str {
            "http://frigate"
        }

        async fn snapshot(&self, _event_id: &str) -> Result<Arc<[u8]>> {
            Ok(Arc::from(vec![0u8]))
        }

        async fn set_sub_label(&self, event_id: &str, label: &str, score: f64) -> Result<()> {
            if self.fail {
                return Err(Error::EventSource("unreachable".to_string()));
            }
            self.sub_labels
                .lock()
                .unwrap()
                .push((event_id.to_string(), label.to_string(), score));
            Ok(())
        }
    }

    fn raw(label: Option<&str>, confidence: f64, bbox: [i64; 4]) -> RawPrediction {
        RawPrediction {
            confidence,
            label: label.map(str::to_string),
            y_min: bbox[0],
            x_min: bbox[1],
            y_max: bbox[2],
            x_max: bbox[3],
        }
    }

    fn pipeline(
        kind: PipelineKind,
        predictions: Vec<RawPrediction>,
        filter: Option<&str>,
    ) -> (Pipeline, Arc<FixedBackend>) {
        let backend = Arc::new(FixedBackend {
            predictions,
            calls: AtomicUsize::new(0),
        });
        let pipeline = Pipeline {
            name: "stage".to_string(),
            kind,
            server: Arc::new(Server {
                name: "cpai".to_string(),
                host: "h".to_string(),
                port: 1,
            }),
            model: None,
            threshold: 0.5,
            result_topic: None,
            filter: filter.map(|f| FilterEngine::new().compile(f).unwrap()),
            backend: backend.clone(),
        };
        (pipeline, backend)
    }

    fn event() -> Event {
        serde_json::from_value(serde_json::json!({
            "id": "ev1",
            "camera": "driveway",
            "label": "car",
            "sub_label": null,
            "attributes": {},
            "current_attributes": []
        }))
        .unwrap()
    }

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(Arc::new(InferencePool::new(2)))
    }

    fn image() -> Arc<[u8]> {
        Arc::from(vec![1u8, 2, 3])
    }

    #[tokio::test]
    async fn test_merges_top_prediction() {
        let (pipeline, _) = pipeline(
            PipelineKind::Object,
            vec![
                raw(Some("truck"), 0.6, [1, 1, 5, 5]),
                raw(Some("car"), 0.9, [2, 2, 6, 6]),
                raw(Some("bike"), 0.3, [3, 3, 7, 7]),
            ],
            None,
        );
        let source = RecordingSource::default();
        let mut ev = event();

        let inference = executor()
            .infer(&pipeline, &mut ev, image(), &source)
            .await
            .unwrap()
            .unwrap();

        // below-threshold "bike" is dropped
        assert_eq!(inference.predictions.len(), 2);
        assert_eq!(ev.sub_label, Some(SubLabel::Scored("car".to_string(), 0.9)));
        assert_eq!(ev.attributes["truck"], 0.6);
        assert_eq!(ev.attributes["car"], 0.9);
        assert_eq!(ev.current_attributes.len(), 2);
        assert_eq!(ev.current_attributes[0].bbox, BoundingBox::from([1, 1, 5, 5]));
        assert_eq!(
            source.sub_labels.lock().unwrap().as_slice(),
            &[("ev1".to_string(), "car".to_string(), 0.9)]
        );
    }

    #[tokio::test]
    async fn test_sub_label_never_lowered() {
        let (pipeline, _) = pipeline(
            PipelineKind::Object,
            vec![raw(Some("van"), 0.7, [1, 1, 5, 5])],
            None,
        );
        let source = RecordingSource::default();
        let mut ev = event();
        ev.set_sub_label("car", 0.95);

        executor()
            .infer(&pipeline, &mut ev, image(), &source)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ev.sub_label, Some(SubLabel::Scored("car".to_string(), 0.95)));
        assert!(source.sub_labels.lock().unwrap().is_empty());
        assert_eq!(ev.attributes["van"], 0.7);
    }

    #[tokio::test]
    async fn test_zero_predictions_is_none() {
        let (pipeline, _) = pipeline(
            PipelineKind::Object,
            vec![raw(Some("car"), 0.2, [1, 1, 5, 5])],
            None,
        );
        let mut ev = event();
        let before = ev.clone();

        let result = executor()
            .infer(&pipeline, &mut ev, image(), &RecordingSource::default())
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(ev, before);
    }

    #[tokio::test]
    async fn test_filter_skips_backend() {
        let (pipeline, backend) = pipeline(
            PipelineKind::Object,
            vec![raw(Some("car"), 0.9, [1, 1, 5, 5])],
            Some(r#"label == "person""#),
        );
        let mut ev = event();
        let before = ev.clone();

        let result = executor()
            .infer(&pipeline, &mut ev, image(), &RecordingSource::default())
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(ev, before);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_face_detect_forces_label() {
        let (pipeline, _) = pipeline(
            PipelineKind::FaceDetect,
            vec![raw(Some("whatever"), 0.8, [1, 1, 5, 5]), raw(None, 0.7, [2, 2, 4, 4])],
            None,
        );
        let mut ev = event();

        let inference = executor()
            .infer(&pipeline, &mut ev, image(), &RecordingSource::default())
            .await
            .unwrap()
            .unwrap();

        assert!(inference.predictions.iter().all(|p| p.label == "face"));
        assert_eq!(ev.attributes.len(), 1);
        assert_eq!(ev.attributes["face"], 0.8);
    }

    #[tokio::test]
    async fn test_sub_label_failure_propagates() {
        let (pipeline, _) = pipeline(
            PipelineKind::FaceRecognize,
            vec![raw(Some("alice"), 0.8, [1, 1, 5, 5])],
            None,
        );
        let source = RecordingSource {
            fail: true,
            ..Default::default()
        };
        let mut ev = event();

        let err = executor()
            .infer(&pipeline, &mut ev, image(), &source)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EventSource(_)));
        assert!(ev.sub_label.is_none());
    }
}
