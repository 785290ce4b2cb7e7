use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use std::time::Duration;

use desk_state::SyncMetrics;

use crate::AppState;

/// A persistence error keeps the server "degraded" for this long.
pub const DEGRADED_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub version: u64,
    pub uptime_secs: u64,
    pub started_at: String,
}

/// "degraded" while a persistence error is younger than `window`, else "healthy".
fn health_status(metrics: &SyncMetrics, window: Duration) -> &'static str {
    if metrics.persistence_error_within(window) {
        "degraded"
    } else {
        "healthy"
    }
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.desktop.metrics().snapshot();
    let version = state.desktop.state().await.version;

    let status = health_status(state.desktop.metrics(), DEGRADED_WINDOW);

    Json(HealthStatus {
        status: status.to_string(),
        connections: state.desktop.connection_count().await as u64,
        version,
        uptime_secs: metrics.uptime_secs,
        started_at: state.started_at.to_rfc3339(),
    })
}

/// Metrics endpoint - returns fan-out and connection counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.desktop.metrics().snapshot())
}

/// Liveness check - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
