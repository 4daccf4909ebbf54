//! Message types for actor communication
//!
//! Commands are request/response messages sent to a specific actor via mpsc;
//! replies travel back over a oneshot channel.

use tokio::sync::oneshot;

use crate::monitors::BatchResult;
use crate::storage::StorageError;

/// Commands that can be sent to the ProberActor
#[derive(Debug)]
pub enum ProberCommand {
    /// Run a probe cycle right away (bypassing the interval timer)
    ///
    /// The cycle is serialized with the periodic ones, so it starts only after
    /// a cycle already in progress has finished.
    ProbeNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<Result<BatchResult, StorageError>>,
    },
}
