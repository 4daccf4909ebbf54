//! On-demand probe cycle

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState};
use crate::monitors::BatchResult;

/// POST /api/probe
///
/// Runs after any cycle already in progress and returns the batch report
pub async fn probe_now(State(state): State<ApiState>) -> ApiResult<Json<BatchResult>> {
    let result = state.prober.probe_now().await?;
    Ok(Json(result))
}
