//! WebAPI - HTTP endpoints
//!
//! ## Responsibilities
//!
//! - Broker hook transport (`POST /exhook/message/publish`)
//! - Health and status
//! - Manual config reload

mod routes;

pub use routes::{create_router, PayloadEncoding, PublishRequest, PublishResponse};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let config_generation = state
        .coordinator
        .current()
        .map(|active| active.generation())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.uptime_sec(),
        config_generation,
    })
}

/// Status endpoint: active snapshot, pool and message counters
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.status() {
        Some(status) => Json(ApiResponse::success(status)),
        None => Json(ApiResponse::error("no configuration snapshot installed")),
    }
}
