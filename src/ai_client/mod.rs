//! AIClient - CodeProject.AI vision adapter
//!
//! ## Responsibilities
//!
//! - Uniform `InferenceBackend` capability used by pipeline stages
//! - Object detection (stock or custom model), face detection and face
//!   recognition against a CodeProject.AI server
//! - Response parsing into raw predictions
//! - Bounded dispatch of inference calls (`InferencePool`)

mod types;
mod worker_pool;

pub use types::*;
pub use worker_pool::InferencePool;

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::time::Duration;

/// Default request timeout for inference servers
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inference capability a pipeline stage is bound to
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Endpoint description for logs
    fn endpoint(&self) -> &str;

    /// Run inference on a JPEG image
    async fn infer(&self, image: Arc<[u8]>) -> Result<Vec<RawPrediction>>;
}

/// Vision API routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionRoute {
    Detection,
    Custom(String),
    FaceDetect,
    FaceRecognize,
}

impl VisionRoute {
    fn path(&self) -> String {
        match self {
            VisionRoute::Detection => "/v1/vision/detection".to_string(),
            VisionRoute::Custom(model) => format!("/v1/vision/custom/{}", model),
            VisionRoute::FaceDetect => "/v1/vision/face".to_string(),
            VisionRoute::FaceRecognize => "/v1/vision/face/recognize".to_string(),
        }
    }
}

/// CodeProject.AI vision client bound to one route
pub struct CodeProjectAiClient {
    client: reqwest::Client,
    url: String,
    min_confidence: f64,
}

impl CodeProjectAiClient {
    /// Create new client for a route on `host:port`
    pub fn new(
        client: reqwest::Client,
        host: &str,
        port: u16,
        route: VisionRoute,
        min_confidence: f64,
    ) -> Self {
        let url = format!("http://{}:{}{}", host, port, route.path());
        Self {
            client,
            url,
            min_confidence,
        }
    }

    /// Object detector; a model name selects the custom-model route
    pub fn object(
        client: reqwest::Client,
        host: &str,
        port: u16,
        model: Option<&str>,
        min_confidence: f64,
    ) -> Self {
        let route = match model {
            Some(model) if !model.is_empty() => VisionRoute::Custom(model.to_string()),
            _ => VisionRoute::Detection,
        };
        Self::new(client, host, port, route, min_confidence)
    }

    pub fn face_detector(
        client: reqwest::Client,
        host: &str,
        port: u16,
        min_confidence: f64,
    ) -> Self {
        Self::new(client, host, port, VisionRoute::FaceDetect, min_confidence)
    }

    pub fn face_recognizer(
        client: reqwest::Client,
        host: &str,
        port: u16,
        min_confidence: f64,
    ) -> Self {
        Self::new(client, host, port, VisionRoute::FaceRecognize, min_confidence)
    }

    /// Build a client with the default timeout
    pub fn http_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(Error::from)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceBackend for CodeProjectAiClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn infer(&self, image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
        let form = Form::new()
            .part(
                "image",
                Part::bytes(image.to_vec())
                    .file_name("snapshot.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("min_confidence", self.min_confidence.to_string());

        let resp = self.client.post(&self.url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "{} returned {} - {}",
                self.url, status, body
            )));
        }

        let result: VisionResponse = resp.json().await?;
        result.into_predictions(&self.url)
    }
}
