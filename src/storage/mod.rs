//! Storage backends for endpoints, samples and agent credentials
//!
//! This module provides a trait-based abstraction over the persistent state
//! the monitoring core reads and writes.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Per-endpoint scoping**: sample writes and retention deletes never
//!   reach across endpoints
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, good for a small fleet
//! - **In-Memory** (fallback): No persistence, for testing or `"backend": "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use fleetwatch::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./fleetwatch.db").await?;
//!     println!("{}", backend.get_stats().await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{Endpoint, EndpointId, NewEndpoint, NewSample, Sample};
