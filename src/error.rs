//! Domain errors of the monitoring core
//!
//! Probe failures never appear here: an unreachable endpoint is a result
//! (`offline`), not an error.

use std::fmt;

use crate::storage::StorageError;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug)]
pub enum MonitorError {
    /// Push token missing or not matching any endpoint
    Authentication,

    /// Push payload or query parameter out of range
    Validation(String),

    /// Endpoint does not exist
    NotFound(String),

    /// Endpoint exists but has no agent token
    NotConfigured(String),

    Storage(StorageError),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Authentication => write!(f, "invalid or missing agent token"),
            MonitorError::Validation(msg) => write!(f, "validation failed: {}", msg),
            MonitorError::NotFound(msg) => write!(f, "{}", msg),
            MonitorError::NotConfigured(msg) => write!(f, "{}", msg),
            MonitorError::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for MonitorError {
    fn from(err: StorageError) -> Self {
        MonitorError::Storage(err)
    }
}
