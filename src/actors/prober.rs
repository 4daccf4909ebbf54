//! ProberActor - Periodically probes every registered endpoint
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─┐
//!             ├─► Prober::run_cycle → fan-out / fan-in → liveness writes
//! ProbeNow ───┘
//!     ↑
//!     └─── cancellation (hub shutdown)
//! ```
//!
//! Cycles never overlap: the timer and on-demand probes are served by the
//! same loop, and a late tick is delayed rather than bunched up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::monitors::{BatchResult, Prober};

use super::messages::ProberCommand;

/// Actor that owns the reachability prober
pub struct ProberActor {
    prober: Prober,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<ProberCommand>,

    interval_duration: Duration,

    cancel: CancellationToken,
}

impl ProberActor {
    pub fn new(
        prober: Prober,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<ProberCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prober,
            command_rx,
            interval_duration,
            cancel,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first cycle starts immediately. The loop runs until the
    /// cancellation token fires.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting prober actor");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }

                _ = ticker.tick() => {
                    match self.prober.run_cycle(&self.cancel).await {
                        Ok(result) if !result.cancelled => {
                            info!(
                                "probe complete: {}/{} endpoints online",
                                result.online, result.total
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("probe cycle failed: {e}"),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ProberCommand::ProbeNow { respond_to } => {
                            debug!("received ProbeNow command");
                            let result = self.prober.run_cycle(&self.cancel).await;
                            let _ = respond_to.send(result);
                        }
                    }
                }
            }
        }

        debug!("prober actor stopped");
    }
}

/// Handle for controlling a ProberActor
///
/// Clones share the same actor. `shutdown` joins the task, so it only has an
/// effect once.
#[derive(Clone)]
pub struct ProberHandle {
    sender: mpsc::Sender<ProberCommand>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ProberHandle {
    /// Spawn a new prober actor
    ///
    /// Cancelling `cancel` (or any of its parents) stops the actor.
    pub fn spawn(prober: Prober, interval_duration: Duration, cancel: CancellationToken) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = ProberActor::new(prober, interval_duration, cmd_rx, cancel.clone());
        let task = tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Run a probe cycle now and wait for its result
    pub async fn probe_now(&self) -> Result<BatchResult> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProberCommand::ProbeNow { respond_to: tx })
            .await
            .context("failed to send ProbeNow command")?;

        let result = rx.await.context("failed to receive response")??;
        Ok(result)
    }

    /// Stop the actor and wait up to `grace` for it to finish
    ///
    /// An actor still running after `grace` is aborted.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.cancel.cancel();

        let Some(mut task) = self.task.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined.context("prober task failed")?,
            Err(_) => {
                warn!("prober did not stop within {grace:?}, aborting");
                task.abort();
            }
        }

        Ok(())
    }
}
