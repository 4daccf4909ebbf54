//! Probe cycles against a full storage backend

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::{
    LivenessStatus,
    actors::ProberHandle,
    config::ProberConfig,
    monitors::{ProbeOutcome, Prober},
    storage::{NewEndpoint, StorageBackend},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{OpenPorts, RecordingBackend};

async fn register(storage: &dyn StorageBackend, addresses: &[&str]) {
    for address in addresses {
        storage
            .insert_endpoint(NewEndpoint::new(*address, *address))
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_mixed_fleet_updates_every_endpoint_once() {
    let storage = Arc::new(RecordingBackend::new());
    register(
        storage.as_ref(),
        &["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"],
    )
    .await;

    let connector = OpenPorts::new(Duration::from_millis(12))
        .with("10.0.0.1", &[22])
        .with("10.0.0.3", &[80])
        .with("10.0.0.4", &[443, 8080]);
    let prober =
        Prober::new(storage.clone(), &ProberConfig::default()).with_connector(Arc::new(connector));

    let result = prober.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.total, 5);
    assert_eq!(result.online, 3);
    assert_eq!(result.offline, 2);

    for endpoint in storage.list_endpoints().await.unwrap() {
        assert_eq!(storage.probe_writes(endpoint.id), 1);
        assert_ne!(endpoint.status, LivenessStatus::Unknown);
        assert!(endpoint.last_checked.is_some());
    }

    let third = &result.reports[2];
    assert_eq!(third.attempted_ports, vec![22, 80]);
    assert_eq!(
        third.outcome,
        ProbeOutcome::Online {
            port: 80,
            latency_ms: 12
        }
    );

    let fourth = &result.reports[3];
    assert_eq!(fourth.attempted_ports, vec![22, 80, 443]);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_does_not_block_other_endpoints() {
    let storage = Arc::new(RecordingBackend::new().failing_probe_write_for(2));
    register(storage.as_ref(), &["10.0.0.1", "10.0.0.2", "10.0.0.3"]).await;

    let connector = OpenPorts::new(Duration::ZERO)
        .with("10.0.0.1", &[22])
        .with("10.0.0.2", &[22])
        .with("10.0.0.3", &[22]);
    let prober =
        Prober::new(storage.clone(), &ProberConfig::default()).with_connector(Arc::new(connector));

    let result = prober.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.write_failures.len(), 1);
    assert_eq!(result.write_failures[0].endpoint_id, 2);

    let endpoints = storage.list_endpoints().await.unwrap();
    assert_eq!(endpoints[0].status, LivenessStatus::Online);
    assert_eq!(endpoints[1].status, LivenessStatus::Unknown);
    assert_eq!(endpoints[2].status, LivenessStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_flips_back_to_offline() {
    let storage = Arc::new(RecordingBackend::new());
    register(storage.as_ref(), &["10.0.0.1"]).await;

    let up = Prober::new(storage.clone(), &ProberConfig::default())
        .with_connector(Arc::new(OpenPorts::new(Duration::from_millis(8)).with("10.0.0.1", &[22])));
    up.run_cycle(&CancellationToken::new()).await.unwrap();

    let endpoint = storage.get_endpoint(1).await.unwrap().unwrap();
    assert_eq!(endpoint.status, LivenessStatus::Online);
    assert_eq!(endpoint.latency_ms, Some(8));

    // One failed cycle is enough, there is no debounce
    let down = Prober::new(storage.clone(), &ProberConfig::default())
        .with_connector(Arc::new(OpenPorts::new(Duration::ZERO)));
    down.run_cycle(&CancellationToken::new()).await.unwrap();

    let endpoint = storage.get_endpoint(1).await.unwrap().unwrap();
    assert_eq!(endpoint.status, LivenessStatus::Offline);
    assert_eq!(endpoint.latency_ms, None);
}

#[tokio::test(start_paused = true)]
async fn test_actor_serves_on_demand_cycles() {
    let storage = Arc::new(RecordingBackend::new());
    register(storage.as_ref(), &["10.0.0.1", "10.0.0.2"]).await;

    let prober = Prober::new(storage.clone(), &ProberConfig::default())
        .with_connector(Arc::new(OpenPorts::new(Duration::ZERO).with("10.0.0.2", &[8080])));
    let handle = ProberHandle::spawn(prober, Duration::from_secs(3600), CancellationToken::new());

    let result = handle.probe_now().await.unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.online, 1);
    assert_eq!(result.reports[1].attempted_ports, vec![22, 80, 443, 8080]);

    // Startup cycle plus the on-demand one
    assert_eq!(storage.probe_writes(1), 2);

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}
