//! TCP reachability probing
//!
//! An endpoint is probed by connecting to each candidate port in order until
//! one accepts. Ports are tried strictly one after another; endpoints within a
//! cycle are probed concurrently.
//!
//! ```text
//! list_endpoints ─► spawn one task per endpoint ─► join all ─► write each result
//!                   (22 → 80 → 443 → 8080)          (ordered)   (failures isolated)
//! ```
//!
//! A probe never returns an error. Timeouts, refusals, resolution failures and
//! even a panicking probe task all end up as an `offline` report for that
//! endpoint alone.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::LivenessStatus;
use crate::config::ProberConfig;
use crate::storage::{Endpoint, EndpointId, StorageBackend, StorageResult};

/// A single connection attempt against `address:port`
///
/// The caller bounds every attempt with its own timeout, so implementations
/// don't need to.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str, port: u16) -> io::Result<()>;
}

/// Plain TCP connect, the connection is closed right away
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str, port: u16) -> io::Result<()> {
        let stream = TcpStream::connect((address, port)).await?;
        drop(stream);
        Ok(())
    }
}

/// What a probe concluded about one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Online {
        port: u16,
        latency_ms: u64,
    },
    Offline {
        /// Error of the last failed attempt, if any attempt was made
        last_error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub endpoint_id: EndpointId,
    pub address: String,
    pub outcome: ProbeOutcome,

    /// Ports tried, in the order they were tried
    pub attempted_ports: Vec<u16>,
}

impl ProbeReport {
    pub fn status(&self) -> LivenessStatus {
        match self.outcome {
            ProbeOutcome::Online { .. } => LivenessStatus::Online,
            ProbeOutcome::Offline { .. } => LivenessStatus::Offline,
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self.outcome {
            ProbeOutcome::Online { latency_ms, .. } => Some(latency_ms),
            ProbeOutcome::Offline { .. } => None,
        }
    }

    fn offline(endpoint: &Endpoint, last_error: String) -> Self {
        Self {
            endpoint_id: endpoint.id,
            address: endpoint.address.clone(),
            outcome: ProbeOutcome::Offline {
                last_error: Some(last_error),
            },
            attempted_ports: Vec::new(),
        }
    }
}

/// A result that could not be persisted
#[derive(Debug, Clone, Serialize)]
pub struct WriteFailure {
    pub endpoint_id: EndpointId,
    pub error: String,
}

/// Summary of one probe cycle
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub reports: Vec<ProbeReport>,
    pub write_failures: Vec<WriteFailure>,

    /// Set when shutdown interrupted the cycle; some results were not written
    pub cancelled: bool,

    pub duration_ms: u64,
}

/// The per-endpoint port sequence, shared by all probe tasks of a cycle
#[derive(Clone)]
struct PortSequence {
    connector: Arc<dyn Connector>,
    ports: Arc<[u16]>,
    timeout: Duration,
}

impl PortSequence {
    async fn probe(&self, endpoint_id: EndpointId, address: String) -> ProbeReport {
        let mut attempted_ports = Vec::with_capacity(self.ports.len());
        let mut last_error = None;

        for &port in self.ports.iter() {
            attempted_ports.push(port);
            let started = Instant::now();

            match tokio::time::timeout(self.timeout, self.connector.connect(&address, port)).await
            {
                Ok(Ok(())) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    trace!("{address}:{port} reachable in {latency_ms}ms");
                    return ProbeReport {
                        endpoint_id,
                        address,
                        outcome: ProbeOutcome::Online { port, latency_ms },
                        attempted_ports,
                    };
                }
                Ok(Err(e)) => {
                    trace!("{address}:{port} failed: {e}");
                    last_error = Some(format!("port {port}: {e}"));
                }
                Err(_) => {
                    trace!("{address}:{port} timed out");
                    last_error = Some(format!(
                        "port {port}: timed out after {}ms",
                        self.timeout.as_millis()
                    ));
                }
            }
        }

        ProbeReport {
            endpoint_id,
            address,
            outcome: ProbeOutcome::Offline { last_error },
            attempted_ports,
        }
    }
}

/// Probes every registered endpoint and records the results
pub struct Prober {
    storage: Arc<dyn StorageBackend>,
    sequence: PortSequence,
}

impl Prober {
    pub fn new(storage: Arc<dyn StorageBackend>, config: &ProberConfig) -> Self {
        Self {
            storage,
            sequence: PortSequence {
                connector: Arc::new(TcpConnector),
                ports: config.ports.clone().into(),
                timeout: config.timeout(),
            },
        }
    }

    /// Replace the connector used for every port attempt
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.sequence.connector = connector;
        self
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sequence.timeout = timeout;
        self
    }

    /// Probe a single endpoint without writing the result
    pub async fn probe_endpoint(&self, endpoint: &Endpoint) -> ProbeReport {
        self.sequence
            .probe(endpoint.id, endpoint.address.clone())
            .await
    }

    /// Probe all given endpoints concurrently
    ///
    /// Reports come back in the order of `endpoints`. If `cancel` fires before
    /// every probe finished, the outstanding tasks are aborted and `None` is
    /// returned.
    pub async fn probe_all(
        &self,
        endpoints: &[Endpoint],
        cancel: &CancellationToken,
    ) -> Option<Vec<ProbeReport>> {
        let mut handles: Vec<JoinHandle<ProbeReport>> = endpoints
            .iter()
            .map(|endpoint| {
                let sequence = self.sequence.clone();
                let (id, address) = (endpoint.id, endpoint.address.clone());
                tokio::spawn(async move { sequence.probe(id, address).await })
            })
            .collect();

        let joined = tokio::select! {
            joined = join_all(handles.iter_mut()) => joined,
            _ = cancel.cancelled() => {
                debug!("cancelled during fan-out, aborting {} probes", handles.len());
                for handle in &handles {
                    handle.abort();
                }
                return None;
            }
        };

        let reports = endpoints
            .iter()
            .zip(joined)
            .map(|(endpoint, joined)| match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!("probe task for endpoint {} failed: {e}", endpoint.id);
                    ProbeReport::offline(endpoint, format!("probe task failed: {e}"))
                }
            })
            .collect();

        Some(reports)
    }

    /// Run one full cycle: fetch endpoints, probe all of them, persist results
    ///
    /// Only listing the endpoints can fail the cycle. Once `cancel` is observed
    /// no further result is written.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> StorageResult<BatchResult> {
        let started_at = Utc::now();
        let started = Instant::now();

        let endpoints = self.storage.list_endpoints().await?;
        debug!("probing {} endpoints", endpoints.len());

        let mut result = BatchResult {
            started_at,
            total: endpoints.len(),
            online: 0,
            offline: 0,
            reports: Vec::new(),
            write_failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        };

        let Some(reports) = self.probe_all(&endpoints, cancel).await else {
            result.cancelled = true;
            result.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(result);
        };

        for report in &reports {
            if cancel.is_cancelled() {
                debug!("cancelled, skipping remaining result writes");
                result.cancelled = true;
                break;
            }

            match report.status() {
                LivenessStatus::Online => result.online += 1,
                _ => result.offline += 1,
            }

            match self
                .storage
                .record_probe_result(
                    report.endpoint_id,
                    report.status(),
                    report.latency_ms(),
                    Utc::now(),
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!("endpoint {} removed during cycle", report.endpoint_id)
                }
                Err(e) => {
                    warn!(
                        "failed to record probe result for endpoint {}: {e}",
                        report.endpoint_id
                    );
                    result.write_failures.push(WriteFailure {
                        endpoint_id: report.endpoint_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        result.reports = reports;
        result.duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            "probe cycle complete: {}/{} online",
            result.online, result.total
        );
        Ok(result)
    }
}
