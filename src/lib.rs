pub mod actors;
pub mod agent;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitors;
pub mod storage;
pub mod util;

use serde::{Deserialize, Serialize};

/// Header carrying the agent credential on every push.
pub const AGENT_TOKEN_HEADER: &str = "X-Agent-Token";

/// Path (relative to the collector base URL) agents push samples to.
pub const SUBMIT_PATH: &str = "/api/metrics/submit";

/// One metrics observation as sent by an agent.
///
/// Load averages are `None` on platforms without load-average support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub uptime_seconds: u64,
    #[serde(default)]
    pub load_avg_1: Option<f64>,
    #[serde(default)]
    pub load_avg_5: Option<f64>,
    #[serde(default)]
    pub load_avg_15: Option<f64>,
}

/// Liveness classification of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl LivenessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessStatus::Unknown => "unknown",
            LivenessStatus::Online => "online",
            LivenessStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LivenessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(LivenessStatus::Unknown),
            "online" => Ok(LivenessStatus::Online),
            "offline" => Ok(LivenessStatus::Offline),
            other => Err(format!("unknown liveness status: {other}")),
        }
    }
}
