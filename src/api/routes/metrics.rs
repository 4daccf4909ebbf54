//! Metrics intake, queries and agent token management

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
};

use crate::{
    AGENT_TOKEN_HEADER, MetricsPayload,
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::{CurrentMetrics, HistoryQuery, SubmitResponse},
    },
    metrics::{AgentCredential, DEFAULT_HISTORY_HOURS, History},
    storage::EndpointId,
};

/// POST /api/metrics/submit
///
/// Authenticated by `X-Agent-Token`, not by the operator token. The token is
/// checked before the body, so an unknown agent always gets a 401.
pub async fn submit_metrics(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<MetricsPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let token = headers
        .get(AGENT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            state.metrics.authenticate(token).await?;
            return Err(ApiError::Unprocessable(rejection.body_text()));
        }
    };

    let receipt = state.metrics.ingest(token, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            status: "ok".to_string(),
            endpoint_id: receipt.endpoint_id,
            sample_id: receipt.sample_id,
        }),
    ))
}

/// GET /api/metrics/current/all
///
/// Latest sample per endpoint, keyed by endpoint id. Endpoints without
/// samples are left out.
pub async fn current_all(
    State(state): State<ApiState>,
) -> ApiResult<Json<BTreeMap<String, CurrentMetrics>>> {
    let snapshots = state.metrics.snapshot_all().await?;

    let current = snapshots
        .iter()
        .filter_map(|snapshot| {
            snapshot
                .latest
                .as_ref()
                .map(|sample| (snapshot.endpoint.id.to_string(), CurrentMetrics::from(sample)))
        })
        .collect();

    Ok(Json(current))
}

/// GET /api/metrics/{id}?hours=N
pub async fn get_history(
    State(state): State<ApiState>,
    path: Result<Path<EndpointId>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<History>> {
    let Path(id) = path?;
    let Query(query) = query?;
    let hours = query.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    let history = state.metrics.history(id, hours).await?;
    Ok(Json(history))
}

/// POST /api/metrics/{id}/token
///
/// Generates a token, replacing (and invalidating) any previous one
pub async fn issue_token(
    State(state): State<ApiState>,
    path: Result<Path<EndpointId>, PathRejection>,
) -> ApiResult<Json<AgentCredential>> {
    let Path(id) = path?;
    Ok(Json(state.metrics.issue_token(id).await?))
}

/// GET /api/metrics/{id}/token
pub async fn get_token(
    State(state): State<ApiState>,
    path: Result<Path<EndpointId>, PathRejection>,
) -> ApiResult<Json<AgentCredential>> {
    let Path(id) = path?;
    Ok(Json(state.metrics.fetch_token(id).await?))
}

/// DELETE /api/metrics/{id}/token
pub async fn revoke_token(
    State(state): State<ApiState>,
    path: Result<Path<EndpointId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    state.metrics.revoke_token(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
