use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use super::MetricsService;
use crate::error::{MonitorError, MonitorResult};
use crate::storage::{Endpoint, EndpointId, Sample};

/// Latest sample of one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub endpoint: Endpoint,
    pub latest: Option<Sample>,
}

/// Samples of a trailing window plus their averages
#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub endpoint_id: EndpointId,
    pub endpoint_name: String,
    pub hours: i64,
    pub current: Option<Sample>,

    /// Most recent first
    pub history: Vec<Sample>,

    pub avg_cpu: Option<f64>,
    pub avg_memory: Option<f64>,
}

/// Arithmetic mean rounded to one decimal, `None` for no values
pub fn average(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return None;
    }
    Some(((sum / count as f64) * 10.0).round() / 10.0)
}

impl MetricsService {
    /// Most recent sample of an endpoint by collection time
    pub async fn snapshot(&self, id: EndpointId) -> MonitorResult<Option<Sample>> {
        self.require_endpoint(id).await?;
        Ok(self.storage.latest_sample(id).await?)
    }

    /// Most recent sample of every endpoint, ordered by endpoint id
    #[instrument(skip(self))]
    pub async fn snapshot_all(&self) -> MonitorResult<Vec<EndpointSnapshot>> {
        let endpoints = self.storage.list_endpoints().await?;
        let mut snapshots = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let latest = self.storage.latest_sample(endpoint.id).await?;
            snapshots.push(EndpointSnapshot { endpoint, latest });
        }

        Ok(snapshots)
    }

    /// Samples of the last `hours` hours with CPU and memory averages
    pub async fn history(&self, id: EndpointId, hours: i64) -> MonitorResult<History> {
        self.history_at(id, hours, Utc::now()).await
    }

    #[instrument(skip(self, now))]
    pub async fn history_at(
        &self,
        id: EndpointId,
        hours: i64,
        now: DateTime<Utc>,
    ) -> MonitorResult<History> {
        if hours < 1 {
            return Err(MonitorError::Validation(format!(
                "hours must be at least 1, got {hours}"
            )));
        }

        let endpoint = self.require_endpoint(id).await?;
        let since = Duration::try_hours(hours)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let samples = self.storage.samples_since(id, since).await?;

        Ok(History {
            endpoint_id: endpoint.id,
            endpoint_name: endpoint.name,
            hours,
            current: samples.first().cloned(),
            avg_cpu: average(samples.iter().map(|s| s.metrics.cpu_percent)),
            avg_memory: average(samples.iter().map(|s| s.metrics.memory_percent)),
            history: samples,
        })
    }
}
