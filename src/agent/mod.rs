//! Host agent: collect local metrics and push them to the hub
//!
//! ```text
//! collect ─► push ─► sleep(interval) ─┐
//!    ▲                                │
//!    └────────────────────────────────┘   (every step races the cancellation token)
//! ```
//!
//! Failures are logged and counted but never change the schedule: there is
//! no backoff and no retry inside an interval.

pub mod collector;
pub mod reporter;

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, warn};

use crate::util::{get_agent_token, get_api_url, get_interval, get_log_level};

pub use collector::{MetricsSource, SysinfoCollector};
pub use reporter::{PushError, Reporter};

/// Consecutive failures after which every further failure logs a warning
pub const FAILURE_WARN_THRESHOLD: u32 = 5;

/// Validated agent settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hub base URL without trailing slash
    pub api_url: String,
    pub token: String,
    pub interval: Duration,
    pub log_level: LevelFilter,
}

/// Invalid or missing agent settings
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    MissingApiUrl,
    MissingToken,
    InvalidInterval(String),
    InvalidLogLevel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiUrl => write!(f, "API_URL environment variable is required"),
            ConfigError::MissingToken => {
                write!(f, "AGENT_TOKEN environment variable is required")
            }
            ConfigError::InvalidInterval(raw) => {
                write!(f, "INTERVAL must be a positive number of seconds, got {raw:?}")
            }
            ConfigError::InvalidLogLevel(raw) => write!(f, "unknown LOG_LEVEL {raw:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AgentConfig {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let api_url = api_url.into().trim().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }

        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval(format!("{interval:?}")));
        }

        Ok(Self {
            api_url,
            token,
            interval,
            log_level: LevelFilter::INFO,
        })
    }

    /// Read `API_URL`, `AGENT_TOKEN`, `INTERVAL` and `LOG_LEVEL`
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level = get_log_level().map_err(ConfigError::InvalidLogLevel)?;
        let interval = get_interval().map_err(ConfigError::InvalidInterval)?;
        let api_url = get_api_url().ok_or(ConfigError::MissingApiUrl)?;
        let token = get_agent_token().ok_or(ConfigError::MissingToken)?;

        Ok(Self {
            log_level,
            ..Self::new(api_url, token, interval)?
        })
    }
}

/// Why a single tick did not deliver a sample
#[derive(Debug)]
pub enum TickError {
    Collect(anyhow::Error),
    Push(PushError),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Collect(e) => write!(f, "failed to collect metrics: {e:#}"),
            TickError::Push(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TickError {}

pub struct Agent<S> {
    config: AgentConfig,
    source: S,
    reporter: Reporter,
    consecutive_failures: u32,
}

impl<S: MetricsSource> Agent<S> {
    pub fn new(config: AgentConfig, source: S) -> anyhow::Result<Self> {
        let reporter = Reporter::new(&config.api_url, &config.token)?;
        Ok(Self {
            config,
            source,
            reporter,
            consecutive_failures: 0,
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Collect one snapshot and push it
    pub async fn run_once(&mut self) -> Result<(), TickError> {
        let payload = self.source.collect().await.map_err(TickError::Collect)?;
        self.reporter.push(&payload).await.map_err(TickError::Push)?;

        debug!(
            "metrics sent: cpu={}%, memory={}%",
            payload.cpu_percent, payload.memory_percent
        );
        Ok(())
    }

    fn record(&mut self, outcome: Result<(), TickError>) {
        match outcome {
            Ok(()) => self.consecutive_failures = 0,
            Err(e) => {
                error!("{e}");
                self.consecutive_failures += 1;
                if self.consecutive_failures >= FAILURE_WARN_THRESHOLD {
                    warn!(
                        "failed to send metrics {} times in a row",
                        self.consecutive_failures
                    );
                }
            }
        }
    }

    /// Run until `cancel` fires
    ///
    /// Collection, the push and the sleep between ticks are all abandoned as
    /// soon as cancellation is requested.
    #[instrument(skip_all, fields(api_url = %self.config.api_url))]
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!(
            "agent starting, pushing every {:?} to {}",
            self.config.interval,
            self.reporter.url()
        );

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_once() => outcome,
            };
            self.record(outcome);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("agent stopped");
    }
}
