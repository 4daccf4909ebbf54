use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::MetricsService;
use crate::MetricsPayload;
use crate::error::{MonitorError, MonitorResult};
use crate::storage::{Endpoint, EndpointId, NewSample};

/// Outcome of an accepted push
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub endpoint_id: EndpointId,
    pub sample_id: i64,

    /// Samples removed by the retention sweep that followed the insert
    #[serde(skip)]
    pub pruned: usize,
}

fn check_percent(field: &str, value: f64) -> MonitorResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(MonitorError::Validation(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> MonitorResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(MonitorError::Validation(format!(
            "{field} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// Range-check every field of a push
///
/// Integer fields are unsigned and can't go negative once deserialized, so
/// only the floating point fields need checking here.
pub fn validate_payload(payload: &MetricsPayload) -> MonitorResult<()> {
    check_percent("cpu_percent", payload.cpu_percent)?;
    check_percent("memory_percent", payload.memory_percent)?;
    check_percent("disk_percent", payload.disk_percent)?;
    check_non_negative("disk_used_gb", payload.disk_used_gb)?;
    check_non_negative("disk_total_gb", payload.disk_total_gb)?;

    for (field, value) in [
        ("load_avg_1", payload.load_avg_1),
        ("load_avg_5", payload.load_avg_5),
        ("load_avg_15", payload.load_avg_15),
    ] {
        if let Some(value) = value {
            check_non_negative(field, value)?;
        }
    }

    Ok(())
}

impl MetricsService {
    /// Resolve the endpoint owning `token`
    pub async fn authenticate(&self, token: Option<&str>) -> MonitorResult<Endpoint> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(MonitorError::Authentication)?;

        self.storage
            .find_endpoint_by_token(token)
            .await?
            .ok_or(MonitorError::Authentication)
    }

    /// Accept a push from an agent
    ///
    /// `token` is the value of the agent token header, if any.
    pub async fn ingest(
        &self,
        token: Option<&str>,
        payload: MetricsPayload,
    ) -> MonitorResult<IngestReceipt> {
        self.ingest_at(token, payload, Utc::now()).await
    }

    /// [`ingest`](Self::ingest) with an explicit acceptance time
    ///
    /// Authentication comes first, so a rejected token leaves no trace even
    /// when the payload is also invalid.
    #[instrument(skip_all)]
    pub async fn ingest_at(
        &self,
        token: Option<&str>,
        payload: MetricsPayload,
        now: DateTime<Utc>,
    ) -> MonitorResult<IngestReceipt> {
        let endpoint = self.authenticate(token).await?;

        validate_payload(&payload)?;

        let sample = self
            .storage
            .record_push(NewSample {
                endpoint_id: endpoint.id,
                collected_at: now,
                metrics: payload,
            })
            .await?
            .ok_or_else(|| {
                warn!("endpoint {} vanished while accepting a push", endpoint.id);
                MonitorError::Authentication
            })?;

        let pruned = match self
            .storage
            .delete_samples_before(endpoint.id, now - self.retention)
            .await
        {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!("retention sweep for endpoint {} failed: {e}", endpoint.id);
                0
            }
        };

        debug!(
            "accepted sample {} for endpoint {} ({} pruned)",
            sample.id, endpoint.id, pruned
        );

        Ok(IngestReceipt {
            endpoint_id: endpoint.id,
            sample_id: sample.id,
            pruned,
        })
    }
}
