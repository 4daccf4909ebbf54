use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fleetwatch.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Endpoints registered on start-up (matched by address)
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Samples older than this many hours are pruned on every push
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,

    #[serde(default)]
    pub prober: ProberConfig,

    #[serde(default)]
    pub api: ApiSection,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub address: String,
}

/// Reachability prober settings. All durations are in seconds.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProberConfig {
    #[serde(default = "default_probe_interval")]
    pub interval: u64,

    /// Timeout of a single port attempt
    #[serde(default = "default_probe_timeout")]
    pub timeout: u64,

    /// Candidate ports, tried in order until one accepts a connection
    #[serde(default = "default_probe_ports")]
    pub ports: Vec<u16>,

    /// How long shutdown waits for an in-flight cycle before abandoning it
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl ProberConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: default_probe_interval(),
            timeout: default_probe_timeout(),
            ports: default_probe_ports(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Bearer token for operator routes. Agent pushes never use it.
    pub auth_token: Option<String>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

pub const DEFAULT_PROBE_PORTS: [u16; 4] = [22, 80, 443, 8080];

fn default_retention_hours() -> u32 {
    24
}

fn default_probe_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_probe_ports() -> Vec<u16> {
    DEFAULT_PROBE_PORTS.to_vec()
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_enable_cors() -> bool {
    true
}

impl Config {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.retention_hours))
    }

    fn validate(self) -> anyhow::Result<Self> {
        if self.prober.ports.is_empty() {
            anyhow::bail!("prober.ports must contain at least one port");
        }
        if self.prober.interval == 0 || self.prober.timeout == 0 {
            anyhow::bail!("prober.interval and prober.timeout must be positive");
        }
        if self.retention_hours == 0 {
            anyhow::bail!("retention_hours must be positive");
        }
        Ok(self)
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str::<Config>(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?
        .validate()
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}
