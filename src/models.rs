//! Shared models and types
//!
//! Event payload, predictions and the API response shapes used by more than
//! one module live here to avoid circular dependencies.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    /// Generation of the active configuration snapshot
    pub config_generation: u64,
}

// ============================================================================
// Event model
// ============================================================================

/// Bounding box in pixel coordinates.
///
/// Serialized as `[y_min, x_min, y_max, x_max]`, the order the event source
/// uses for `box`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct BoundingBox {
    pub y_min: i64,
    pub x_min: i64,
    pub y_max: i64,
    pub x_max: i64,
}

impl From<[i64; 4]> for BoundingBox {
    fn from(b: [i64; 4]) -> Self {
        Self {
            y_min: b[0],
            x_min: b[1],
            y_max: b[2],
            x_max: b[3],
        }
    }
}

impl From<BoundingBox> for [i64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.y_min, b.x_min, b.y_max, b.x_max]
    }
}

/// Secondary classification attached to an event.
///
/// The event source sends either `["name", 0.93]` or a bare `"name"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubLabel {
    Scored(String, f64),
    Plain(String),
}

impl SubLabel {
    pub fn label(&self) -> &str {
        match self {
            SubLabel::Scored(label, _) | SubLabel::Plain(label) => label,
        }
    }

    /// Confidence, if the event source recorded one
    pub fn score(&self) -> Option<f64> {
        match self {
            SubLabel::Scored(_, score) => Some(*score),
            SubLabel::Plain(_) => None,
        }
    }
}

/// One entry of `current_attributes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub label: String,
    pub score: f64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl From<&Prediction> for AttributeRecord {
    fn from(p: &Prediction) -> Self {
        Self {
            label: p.label.clone(),
            score: p.confidence,
            bbox: p.bbox,
        }
    }
}

/// Tracked-object event taken from the `after` section of a payload.
///
/// Only the fields the pipelines touch are typed; everything else is kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub camera: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sub_label: Option<SubLabel>,
    /// label -> highest confidence seen
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_attributes: Vec<AttributeRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// Field map handed to filter predicates
    pub fn fields(&self) -> crate::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(crate::Error::Internal(format!(
                "event serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Confidence of the current sub-label; `None` counts as unset
    pub fn sub_label_score(&self) -> Option<f64> {
        self.sub_label.as_ref().and_then(SubLabel::score)
    }

    /// Whether `confidence` should replace the current sub-label
    pub fn should_replace_sub_label(&self, confidence: f64) -> bool {
        match self.sub_label_score() {
            None => true,
            Some(current) => current < confidence,
        }
    }

    pub fn set_sub_label(&mut self, label: &str, confidence: f64) {
        self.sub_label = Some(SubLabel::Scored(label.to_string(), confidence));
    }

    /// Keep, per label, the highest confidence observed
    pub fn merge_attributes(&mut self, predictions: &[Prediction]) {
        for p in predictions {
            let entry = self.attributes.entry(p.label.clone()).or_insert(p.confidence);
            if p.confidence > *entry {
                *entry = p.confidence;
            }
        }
    }

    /// Append prediction records, one per distinct box.
    ///
    /// Existing records keep their place. Incoming ones are ranked by
    /// confidence first, so the most confident prediction wins a shared box.
    pub fn merge_current_attributes(&mut self, predictions: &[Prediction]) {
        let mut seen: HashSet<BoundingBox> = HashSet::with_capacity(self.current_attributes.len());
        let existing = std::mem::take(&mut self.current_attributes);
        let incoming = rank_by_confidence(predictions)
            .into_iter()
            .map(AttributeRecord::from);

        self.current_attributes = existing
            .into_iter()
            .chain(incoming)
            .filter(|record| seen.insert(record.bbox))
            .collect();
    }
}

// ============================================================================
// Inference model
// ============================================================================

/// Inference backend family a pipeline is bound to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    #[default]
    Object,
    #[serde(alias = "face-detect")]
    FaceDetect,
    #[serde(alias = "face-recognize")]
    FaceRecognize,
}

impl PipelineKind {
    /// Label used when the server returns a prediction without one
    pub fn fallback_label(self) -> &'static str {
        match self {
            PipelineKind::Object => "unknown",
            PipelineKind::FaceDetect | PipelineKind::FaceRecognize => FACE_LABEL,
        }
    }

    /// Pure detection pipelines label every prediction with the kind itself
    pub fn forced_label(self) -> Option<&'static str> {
        match self {
            PipelineKind::FaceDetect => Some(FACE_LABEL),
            PipelineKind::Object | PipelineKind::FaceRecognize => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::Object => "object",
            PipelineKind::FaceDetect => "face_detect",
            PipelineKind::FaceRecognize => "face_recognize",
        }
    }
}

const FACE_LABEL: &str = "face";

/// A single detection returned by an inference server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Predictions produced by one pipeline invocation, in backend order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Pipeline that produced this inference
    pub pipeline: String,
    pub predictions: Vec<Prediction>,
}

impl Inference {
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Highest-confidence prediction; ties go to the earliest one
    pub fn top_prediction(&self) -> Option<&Prediction> {
        rank_by_confidence(&self.predictions).first().copied()
    }
}

/// Predictions by descending confidence
fn rank_by_confidence(predictions: &[Prediction]) -> Vec<&Prediction> {
    let mut ranked: Vec<&Prediction> = predictions.iter().collect();
    // sort_by is stable, so equal confidences keep backend order
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
