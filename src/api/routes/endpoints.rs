//! Registered endpoints and their liveness

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState};

/// GET /api/endpoints
pub async fn list_endpoints(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let endpoints = state.metrics.storage().list_endpoints().await?;

    Ok(Json(json!({
        "count": endpoints.len(),
        "endpoints": endpoints,
    })))
}
