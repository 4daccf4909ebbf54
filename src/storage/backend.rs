//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{Endpoint, EndpointId, NewEndpoint, NewSample, Sample};
use crate::LivenessStatus;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// The trait covers three concerns:
///
/// - **Registry boundary**: endpoint creation, listing and cascading deletion.
///   The registry itself lives outside the monitoring core; these methods are
///   the narrow surface the core and the hub's start-up seeding rely on.
/// - **Liveness**: two independent writers (prober, ingestion) overwrite the
///   liveness fields of a single endpoint.
/// - **Samples and credentials**: per-endpoint sample writes, window queries,
///   retention deletes and the agent token column.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// prober actor and request handlers.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Operations addressing an endpoint that
/// does not exist report it through their return value (`Option`/`bool`)
/// rather than an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Register a new endpoint with `unknown` liveness and no credential
    async fn insert_endpoint(&self, endpoint: NewEndpoint) -> StorageResult<Endpoint>;

    /// All registered endpoints, ordered by id
    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>>;

    async fn get_endpoint(&self, id: EndpointId) -> StorageResult<Option<Endpoint>>;

    /// Delete an endpoint together with its samples and credential
    async fn delete_endpoint(&self, id: EndpointId) -> StorageResult<bool>;

    /// Overwrite status, latency and last-checked from a probe result
    ///
    /// Returns `false` if the endpoint no longer exists.
    async fn record_probe_result(
        &self,
        id: EndpointId,
        status: LivenessStatus,
        latency_ms: Option<u64>,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Store a pushed sample and mark its endpoint online, as one unit
    ///
    /// `last_checked` becomes the sample's `collected_at`; the probe latency is
    /// left untouched. Either both writes happen or neither does. Returns
    /// `None`, having written nothing, if the endpoint no longer exists.
    async fn record_push(&self, sample: NewSample) -> StorageResult<Option<Sample>>;

    /// Look up the endpoint whose active credential equals `token`
    async fn find_endpoint_by_token(&self, token: &str) -> StorageResult<Option<Endpoint>>;

    /// Replace (or clear, with `None`) the endpoint's credential in one write
    ///
    /// Fails with `StorageError::Conflict` if another endpoint already holds
    /// the token.
    async fn set_agent_token(&self, id: EndpointId, token: Option<String>) -> StorageResult<bool>;

    async fn insert_sample(&self, sample: NewSample) -> StorageResult<Sample>;

    /// Most recent sample of an endpoint by collection timestamp
    async fn latest_sample(&self, id: EndpointId) -> StorageResult<Option<Sample>>;

    /// Samples collected at or after `since`, most recent first
    async fn samples_since(
        &self,
        id: EndpointId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Sample>>;

    /// Delete one endpoint's samples collected strictly before `before`
    ///
    /// Returns the number of samples deleted.
    async fn delete_samples_before(
        &self,
        id: EndpointId,
        before: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Human readable stats about the backend
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
