use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Registered subscriber identities.
    pub subscriptions: usize,
    /// Identities with a live stream.
    pub streaming: usize,
}

/// GET /health -- returns service health and subscription counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.hub.registry();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        subscriptions: registry.len(),
        streaming: registry.streaming_count(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
