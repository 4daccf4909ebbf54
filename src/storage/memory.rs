//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Deployments configured with `"backend": "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Single process**: state lives behind one `RwLock`

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{Endpoint, EndpointId, NewEndpoint, NewSample, Sample};
use crate::LivenessStatus;

#[derive(Debug, Default)]
struct Inner {
    endpoints: BTreeMap<EndpointId, Endpoint>,

    /// Samples grouped by endpoint, in insertion order
    samples: HashMap<EndpointId, Vec<Sample>>,

    last_endpoint_id: EndpointId,
    last_sample_id: i64,
}

/// In-memory storage backend
///
/// Every operation takes the lock once, so a token rotation or a liveness
/// overwrite is observed either entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &Sample, b: &Sample) -> std::cmp::Ordering {
    b.collected_at
        .cmp(&a.collected_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_endpoint(&self, endpoint: NewEndpoint) -> StorageResult<Endpoint> {
        let mut inner = self.inner.write().await;
        inner.last_endpoint_id += 1;

        let endpoint = Endpoint {
            id: inner.last_endpoint_id,
            name: endpoint.name,
            address: endpoint.address,
            status: LivenessStatus::Unknown,
            latency_ms: None,
            last_checked: None,
            agent_token: None,
        };
        inner.endpoints.insert(endpoint.id, endpoint.clone());

        debug!("registered endpoint {} ({})", endpoint.id, endpoint.address);
        Ok(endpoint)
    }

    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>> {
        Ok(self.inner.read().await.endpoints.values().cloned().collect())
    }

    async fn get_endpoint(&self, id: EndpointId) -> StorageResult<Option<Endpoint>> {
        Ok(self.inner.read().await.endpoints.get(&id).cloned())
    }

    async fn delete_endpoint(&self, id: EndpointId) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        inner.samples.remove(&id);
        Ok(inner.endpoints.remove(&id).is_some())
    }

    async fn record_probe_result(
        &self,
        id: EndpointId,
        status: LivenessStatus,
        latency_ms: Option<u64>,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(endpoint) = inner.endpoints.get_mut(&id) else {
            return Ok(false);
        };

        endpoint.status = status;
        endpoint.latency_ms = latency_ms;
        endpoint.last_checked = Some(checked_at);
        Ok(true)
    }

    async fn record_push(&self, sample: NewSample) -> StorageResult<Option<Sample>> {
        let mut inner = self.inner.write().await;
        let Some(endpoint) = inner.endpoints.get_mut(&sample.endpoint_id) else {
            return Ok(None);
        };

        endpoint.status = LivenessStatus::Online;
        endpoint.last_checked = Some(sample.collected_at);

        inner.last_sample_id += 1;
        let sample = Sample::from_new(inner.last_sample_id, sample);
        inner
            .samples
            .entry(sample.endpoint_id)
            .or_default()
            .push(sample.clone());

        Ok(Some(sample))
    }

    async fn find_endpoint_by_token(&self, token: &str) -> StorageResult<Option<Endpoint>> {
        let inner = self.inner.read().await;
        Ok(inner
            .endpoints
            .values()
            .find(|endpoint| endpoint.agent_token.as_deref() == Some(token))
            .cloned())
    }

    async fn set_agent_token(&self, id: EndpointId, token: Option<String>) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        if let Some(token) = &token {
            let taken = inner
                .endpoints
                .values()
                .any(|endpoint| endpoint.id != id && endpoint.agent_token.as_ref() == Some(token));
            if taken {
                return Err(StorageError::Conflict(
                    "agent token already in use".to_string(),
                ));
            }
        }

        let Some(endpoint) = inner.endpoints.get_mut(&id) else {
            return Ok(false);
        };
        endpoint.agent_token = token;
        Ok(true)
    }

    async fn insert_sample(&self, sample: NewSample) -> StorageResult<Sample> {
        let mut inner = self.inner.write().await;
        if !inner.endpoints.contains_key(&sample.endpoint_id) {
            return Err(StorageError::QueryFailed(format!(
                "endpoint {} does not exist",
                sample.endpoint_id
            )));
        }

        inner.last_sample_id += 1;
        let sample = Sample::from_new(inner.last_sample_id, sample);
        inner
            .samples
            .entry(sample.endpoint_id)
            .or_default()
            .push(sample.clone());

        Ok(sample)
    }

    async fn latest_sample(&self, id: EndpointId) -> StorageResult<Option<Sample>> {
        let inner = self.inner.read().await;
        Ok(inner
            .samples
            .get(&id)
            .and_then(|samples| samples.iter().min_by(|a, b| newest_first(a, b)))
            .cloned())
    }

    async fn samples_since(
        &self,
        id: EndpointId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Sample>> {
        let inner = self.inner.read().await;
        let mut samples: Vec<Sample> = inner
            .samples
            .get(&id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|sample| sample.collected_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        samples.sort_by(newest_first);
        Ok(samples)
    }

    async fn delete_samples_before(
        &self,
        id: EndpointId,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let Some(samples) = inner.samples.get_mut(&id) else {
            return Ok(0);
        };

        let count = samples.len();
        samples.retain(|sample| sample.collected_at >= before);
        Ok(count - samples.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        let total: usize = inner.samples.values().map(Vec::len).sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_samples".to_string(), total.to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let inner = self.inner.read().await;
        let total: usize = inner.samples.values().map(Vec::len).sum();

        Ok(format!(
            "In-Memory: {} samples across {} endpoints",
            total,
            inner.endpoints.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
