//! Error handling for the exhook service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::Inference;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed API request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration (schema, cross-reference, pattern, filter source)
    #[error("Config error: {0}")]
    Config(String),

    /// Filter predicate evaluation failed
    #[error("Filter error: {0}")]
    Filter(String),

    /// Inference server answered but reported a failure
    #[error("API error: {0}")]
    Api(String),

    /// Event source (Frigate) rejected a request
    #[error("Event source error: {0}")]
    EventSource(String),

    /// A pipeline stage failed; keeps what the chain produced before the failure
    #[error(
        "Inference failed on event {event_id} after {} completed stage(s): {source}",
        .inferences.len()
    )]
    InferenceChain {
        event_id: String,
        inferences: Vec<Inference>,
        source: Box<Error>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Partial inferences carried by a failed chain (empty otherwise)
    pub fn partial_inferences(&self) -> &[Inference] {
        match self {
            Error::InferenceChain { inferences, .. } => inferences,
            _ => &[],
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Error::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIG_ERROR"),
            Error::Filter(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FILTER_ERROR"),
            Error::Api(_) => (StatusCode::BAD_GATEWAY, "API_ERROR"),
            Error::EventSource(_) => (StatusCode::BAD_GATEWAY, "EVENT_SOURCE_ERROR"),
            Error::InferenceChain { .. } => (StatusCode::BAD_GATEWAY, "INFERENCE_ERROR"),
            Error::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
