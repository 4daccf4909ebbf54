//! REST API of the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **MetricsService** for intake, queries and credentials
//! - **ProberHandle** for on-demand probe cycles
//!
//! ## Endpoints
//!
//! Agent-facing (authenticated by `X-Agent-Token`):
//!
//! - `POST /api/metrics/submit` - Push a sample
//!
//! Operator-facing (Bearer token when `auth_token` is configured):
//!
//! - `GET /api/metrics/current/all` - Latest sample per endpoint
//! - `GET /api/metrics/{id}?hours=N` - History with averages
//! - `POST|GET|DELETE /api/metrics/{id}/token` - Agent token lifecycle
//! - `GET /api/endpoints` - Endpoints with liveness
//! - `POST /api/probe` - Run a probe cycle now
//!
//! Public:
//!
//! - `GET /api/health` - Health check

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{CurrentMetrics, HealthResponse, HistoryQuery, SubmitResponse};

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ApiSection;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8000")
    pub bind_addr: SocketAddr,

    /// Optional bearer token for operator routes
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl From<&ApiSection> for ApiConfig {
    fn from(section: &ApiSection) -> Self {
        Self {
            bind_addr: section.bind,
            auth_token: section.auth_token.clone(),
            enable_cors: section.enable_cors,
        }
    }
}

/// Build the full router
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut operator = Router::new()
        .route("/api/metrics/current/all", get(routes::metrics::current_all))
        .route("/api/metrics/:id", get(routes::metrics::get_history))
        .route(
            "/api/metrics/:id/token",
            post(routes::metrics::issue_token)
                .get(routes::metrics::get_token)
                .delete(routes::metrics::revoke_token),
        )
        .route("/api/endpoints", get(routes::endpoints::list_endpoints))
        .route("/api/probe", post(routes::probe::probe_now));

    if let Some(token) = &config.auth_token {
        operator = operator.route_layer(axum::middleware::from_fn_with_state(
            middleware::auth::OperatorToken::new(token),
            middleware::auth::auth_middleware,
        ));
    }

    let public = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route(
            "/api/metrics/submit",
            post(routes::metrics::submit_metrics),
        );

    let mut app = public
        .merge(operator)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// The server stops accepting connections once `cancel` fires and finishes
/// in-flight requests. Returns the bound address and the server task.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let task = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("API server error: {}", e);
        }
    });

    Ok((addr, task))
}
