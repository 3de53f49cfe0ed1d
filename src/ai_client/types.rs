//! CodeProject.AI response types

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Prediction};
use serde::{Deserialize, Serialize};

/// Prediction as returned by the vision API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub confidence: f64,

    /// Object label, or `userid` for face recognition
    #[serde(default, alias = "userid")]
    pub label: Option<String>,

    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl RawPrediction {
    /// Convert, using `fallback_label` when the server sent none
    pub fn into_prediction(self, fallback_label: &str) -> Prediction {
        let label = match self.label {
            Some(label) if !label.is_empty() => label,
            _ => fallback_label.to_string(),
        };
        Prediction {
            label,
            confidence: self.confidence,
            bbox: BoundingBox {
                y_min: self.y_min,
                x_min: self.x_min,
                y_max: self.y_max,
                x_max: self.x_max,
            },
        }
    }
}

/// Vision API response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionResponse {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub predictions: Vec<RawPrediction>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default, rename = "inferenceMs")]
    pub inference_ms: Option<i64>,
}

impl VisionResponse {
    /// Predictions, or an error when the server reported failure
    pub fn into_predictions(self, endpoint: &str) -> Result<Vec<RawPrediction>> {
        if self.success == Some(false) {
            return Err(Error::Api(format!(
                "{} reported failure: {}",
                endpoint,
                self.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(self.predictions)
    }
}
