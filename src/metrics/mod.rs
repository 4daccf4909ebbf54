//! Metrics ingestion, retention, queries and agent credentials
//!
//! [`MetricsService`] is built once by the hub and shared behind an `Arc`.
//! Every operation addresses one endpoint; nothing here holds state between
//! calls apart from the storage backend.

mod credentials;
mod ingest;
mod query;

use std::sync::Arc;

use crate::error::{MonitorError, MonitorResult};
use crate::storage::{Endpoint, EndpointId, StorageBackend};

pub use credentials::{AgentCredential, generate_token};
pub use ingest::{IngestReceipt, validate_payload};
pub use query::{EndpointSnapshot, History, average};

/// Samples older than this are pruned on every accepted push
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Trailing window used by history queries that don't name one
pub const DEFAULT_HISTORY_HOURS: i64 = 12;

pub struct MetricsService {
    storage: Arc<dyn StorageBackend>,
    retention: chrono::Duration,
}

impl MetricsService {
    pub fn new(storage: Arc<dyn StorageBackend>, retention: chrono::Duration) -> Self {
        Self { storage, retention }
    }

    pub fn with_default_retention(storage: Arc<dyn StorageBackend>) -> Self {
        Self::new(storage, chrono::Duration::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    async fn require_endpoint(&self, id: EndpointId) -> MonitorResult<Endpoint> {
        self.storage
            .get_endpoint(id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("endpoint {id} not found")))
    }
}
