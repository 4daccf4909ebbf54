//! API shared state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::actors::ProberHandle;
use crate::metrics::MetricsService;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Ingestion, queries and credentials
    pub metrics: Arc<MetricsService>,

    /// Handle to the prober actor for on-demand cycles
    pub prober: ProberHandle,

    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(metrics: Arc<MetricsService>, prober: ProberHandle) -> Self {
        Self {
            metrics,
            prober,
            started_at: Utc::now(),
        }
    }
}
