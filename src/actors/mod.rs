//! Background actors of the hub
//!
//! Each actor runs as an independent async task and is driven through a typed
//! handle that owns the task's `JoinHandle`.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for replies
//! 3. **Shutdown**: a `CancellationToken` observed at every suspension point

pub mod messages;
pub mod prober;

pub use prober::{ProberActor, ProberHandle};
