//! Row types shared by all storage backends
//!
//! ## Endpoints
//!
//! An [`Endpoint`] carries the liveness fields that two independent writers
//! touch: the reachability prober (status, latency, last check) and the
//! ingestion path (status and last check only). Both perform whole-field
//! overwrites, so the last writer wins.
//!
//! ## Samples
//!
//! A [`Sample`] is an immutable metrics observation. The measured values are
//! kept as the typed [`MetricsPayload`] the agent sent; backends store them as
//! individual columns so retention and window queries stay index-friendly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LivenessStatus, MetricsPayload};

/// Identity of a registered endpoint
pub type EndpointId = i64;

/// A monitored host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,

    /// Display name for the endpoint (for UI/logging)
    pub name: String,

    /// Host name or IP literal the prober connects to
    pub address: String,

    pub status: LivenessStatus,

    /// Connect time of the last successful probe (milliseconds)
    ///
    /// Only the prober writes this field.
    pub latency_ms: Option<u64>,

    pub last_checked: Option<DateTime<Utc>>,

    /// Active agent credential, never serialized into API responses
    #[serde(skip)]
    pub agent_token: Option<String>,
}

/// Registration data for a new endpoint
#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub name: String,
    pub address: String,
}

impl NewEndpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A sample about to be written
#[derive(Debug, Clone)]
pub struct NewSample {
    pub endpoint_id: EndpointId,
    pub collected_at: DateTime<Utc>,
    pub metrics: MetricsPayload,
}

/// A persisted metrics observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub endpoint_id: EndpointId,

    /// When the hub accepted the sample (always UTC)
    pub collected_at: DateTime<Utc>,

    #[serde(flatten)]
    pub metrics: MetricsPayload,
}

impl Sample {
    pub fn from_new(id: i64, sample: NewSample) -> Self {
        Self {
            id,
            endpoint_id: sample.endpoint_id,
            collected_at: sample.collected_at,
            metrics: sample.metrics,
        }
    }
}
