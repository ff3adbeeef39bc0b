//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::gateway::GatewayStats;
use crate::state::{AppState, ServiceStatus};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    uptime_seconds: u64,
    provider: ServiceStatus,
    gateway: GatewayStats,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Gateway load and provider readiness.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let provider = state.provider_status();

    Json(StatusResponse {
        status: provider,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_SHORT").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        provider,
        gateway: state.gateway.stats(),
    })
}
