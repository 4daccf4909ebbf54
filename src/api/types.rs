//! API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{EndpointId, Sample};

/// Returned by `POST /api/metrics/submit`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub endpoint_id: EndpointId,
    pub sample_id: i64,
}

/// Latest sample summary, one per endpoint in `GET /api/metrics/current/all`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_percent: f64,
    pub collected_at: DateTime<Utc>,
}

impl From<&Sample> for CurrentMetrics {
    fn from(sample: &Sample) -> Self {
        Self {
            cpu_percent: sample.metrics.cpu_percent,
            memory_percent: sample.metrics.memory_percent,
            memory_used_mb: sample.metrics.memory_used_mb,
            memory_total_mb: sample.metrics.memory_total_mb,
            disk_percent: sample.metrics.disk_percent,
            collected_at: sample.collected_at,
        }
    }
}

/// Query parameters of `GET /api/metrics/{id}`
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Trailing window in hours (default: 12)
    pub hours: Option<i64>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage_healthy: bool,
    pub uptime_seconds: i64,
}
