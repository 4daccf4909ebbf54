//! Push intake, retention and the interplay with the prober

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use fleetwatch::{
    LivenessStatus,
    config::ProberConfig,
    error::MonitorError,
    metrics::MetricsService,
    monitors::Prober,
    storage::{MemoryBackend, NewEndpoint, StorageBackend},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{OpenPorts, RecordingBackend, beginning_of_time, payload};

async fn endpoint_with_token(storage: &dyn StorageBackend, service: &MetricsService) -> String {
    storage
        .insert_endpoint(NewEndpoint::new("web-1", "10.0.0.1"))
        .await
        .unwrap();
    service.issue_token(1).await.unwrap().agent_token
}

#[tokio::test]
async fn test_retention_removes_rows_older_than_horizon() {
    let storage = Arc::new(MemoryBackend::new());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    let now = Utc::now();
    service
        .ingest_at(Some(&token), payload(90.0, 90.0), now - chrono::Duration::hours(25))
        .await
        .unwrap();
    service
        .ingest_at(Some(&token), payload(10.0, 20.0), now)
        .await
        .unwrap();

    let history = service.history_at(1, 48, now).await.unwrap();
    assert_eq!(history.history.len(), 1);
    assert_eq!(history.history[0].collected_at, now);
    assert_eq!(history.avg_cpu, Some(10.0));

    let stored = storage.samples_since(1, beginning_of_time()).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_retention_is_scoped_to_the_pushing_endpoint() {
    let storage = Arc::new(MemoryBackend::new());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    storage
        .insert_endpoint(NewEndpoint::new("web-2", "10.0.0.2"))
        .await
        .unwrap();
    let other = service.issue_token(2).await.unwrap().agent_token;

    let now = Utc::now();
    let old = now - chrono::Duration::hours(30);
    service.ingest_at(Some(&token), payload(1.0, 1.0), old).await.unwrap();
    service.ingest_at(Some(&other), payload(1.0, 1.0), old).await.unwrap();

    service.ingest_at(Some(&token), payload(2.0, 2.0), now).await.unwrap();

    assert_eq!(storage.samples_since(1, beginning_of_time()).await.unwrap().len(), 1);
    assert_eq!(storage.samples_since(2, beginning_of_time()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unmatched_token_changes_nothing() {
    let storage = Arc::new(MemoryBackend::new());
    let service = MetricsService::with_default_retention(storage.clone());
    endpoint_with_token(storage.as_ref(), &service).await;

    let result = service.ingest(Some("deadbeef"), payload(5.0, 5.0)).await;
    assert_matches!(result, Err(MonitorError::Authentication));

    assert!(storage.samples_since(1, beginning_of_time()).await.unwrap().is_empty());
    let endpoint = storage.get_endpoint(1).await.unwrap().unwrap();
    assert_eq!(endpoint.status, LivenessStatus::Unknown);
    assert!(endpoint.last_checked.is_none());
}

#[tokio::test]
async fn test_failing_retention_sweep_keeps_the_push() {
    let storage = Arc::new(RecordingBackend::new().failing_prune());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    let receipt = service
        .ingest(Some(&token), payload(5.0, 5.0))
        .await
        .unwrap();

    assert_eq!(receipt.pruned, 0);
    assert!(storage.latest_sample(1).await.unwrap().is_some());
    assert_eq!(
        storage.get_endpoint(1).await.unwrap().unwrap().status,
        LivenessStatus::Online
    );
}

#[tokio::test]
async fn test_failed_push_write_leaves_no_sample_and_no_liveness_change() {
    let storage = Arc::new(RecordingBackend::new().failing_push());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    let result = service.ingest(Some(&token), payload(5.0, 5.0)).await;

    assert_matches!(result, Err(MonitorError::Storage(_)));
    assert!(storage.samples_since(1, beginning_of_time()).await.unwrap().is_empty());

    let endpoint = storage.get_endpoint(1).await.unwrap().unwrap();
    assert_eq!(endpoint.status, LivenessStatus::Unknown);
    assert!(endpoint.last_checked.is_none());
}

#[tokio::test]
async fn test_push_for_deleted_endpoint_is_rejected_without_writes() {
    let storage = Arc::new(MemoryBackend::new());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    let endpoint = service.authenticate(Some(&token)).await.unwrap();
    storage.delete_endpoint(endpoint.id).await.unwrap();

    let result = service.ingest(Some(&token), payload(5.0, 5.0)).await;

    assert_matches!(result, Err(MonitorError::Authentication));
    assert!(storage.samples_since(1, beginning_of_time()).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_probe_and_push_share_liveness_last_write_wins() {
    let storage = Arc::new(MemoryBackend::new());
    let service = MetricsService::with_default_retention(storage.clone());
    let token = endpoint_with_token(storage.as_ref(), &service).await;

    // Host drops TCP probes but its agent still pushes
    let prober = Prober::new(storage.clone(), &ProberConfig::default())
        .with_connector(Arc::new(OpenPorts::new(Duration::ZERO)));

    prober.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        storage.get_endpoint(1).await.unwrap().unwrap().status,
        LivenessStatus::Offline
    );

    service.ingest(Some(&token), payload(5.0, 5.0)).await.unwrap();
    let endpoint = storage.get_endpoint(1).await.unwrap().unwrap();
    assert_eq!(endpoint.status, LivenessStatus::Online);
    assert_eq!(endpoint.latency_ms, None);

    prober.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        storage.get_endpoint(1).await.unwrap().unwrap().status,
        LivenessStatus::Offline
    );
}
