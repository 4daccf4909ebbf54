//! Health check endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/health
///
/// Liveness of the hub itself; never requires authentication
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage_healthy = state
        .metrics
        .storage()
        .health_check()
        .await
        .map(|health| health.healthy)
        .unwrap_or(false);

    let now = Utc::now();
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now.to_rfc3339(),
        storage_healthy,
        uptime_seconds: (now - state.started_at).num_seconds(),
    })
}
