//! API Routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hook_provider::Decision;
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::service_status))
        // Broker hook
        .route("/exhook/message/publish", post(message_publish))
        // Config
        .route("/api/config/reload", post(reload_config))
        .with_state(state)
}

// ========================================
// Broker hook
// ========================================

/// How a payload is carried inside the JSON envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Plain,
    Base64,
}

impl PayloadEncoding {
    fn decode(self, payload: &str) -> Result<Vec<u8>> {
        match self {
            PayloadEncoding::Plain => Ok(payload.as_bytes().to_vec()),
            PayloadEncoding::Base64 => STANDARD
                .decode(payload)
                .map_err(|e| Error::InvalidRequest(format!("payload is not valid base64: {}", e))),
        }
    }

    fn encode(self, payload: Vec<u8>) -> Result<String> {
        match self {
            PayloadEncoding::Plain => String::from_utf8(payload)
                .map_err(|e| Error::Internal(format!("enriched payload is not UTF-8: {}", e))),
            PayloadEncoding::Base64 => Ok(STANDARD.encode(payload)),
        }
    }
}

/// `message.publish` hook request
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub encoding: PayloadEncoding,
}

/// `message.publish` hook verdict, payload in the request's encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl PublishResponse {
    fn from_decision(decision: Decision, encoding: PayloadEncoding) -> Result<Self> {
        let label = decision.as_str().to_string();
        match decision {
            Decision::Ignore => Ok(Self {
                decision: label,
                payload: None,
                topic: None,
            }),
            Decision::Continue { payload, topic } => Ok(Self {
                decision: label,
                payload: Some(encoding.encode(payload)?),
                topic,
            }),
        }
    }
}

async fn message_publish(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResponse>> {
    let payload = req.encoding.decode(&req.payload)?;
    let decision = state.hook.on_message_publish(&req.topic, &payload).await;
    PublishResponse::from_decision(decision, req.encoding).map(Json)
}

// ========================================
// Config
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReloadResponse {
    generation: u64,
}

async fn reload_config(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ReloadResponse>>> {
    let generation = state.watcher.reload().await.map_err(|e| {
        tracing::error!(error = %e, "Manual config reload failed");
        e
    })?;
    Ok(Json(ApiResponse::success(ReloadResponse { generation })))
}
