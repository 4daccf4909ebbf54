use std::time::Duration;

use tracing::{error, level_filters::LevelFilter};

const API_URL: &str = "API_URL";

pub fn get_api_url() -> Option<String> {
    std::env::var(API_URL)
        .ok()
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}

const AGENT_TOKEN: &str = "AGENT_TOKEN";

pub fn get_agent_token() -> Option<String> {
    std::env::var(AGENT_TOKEN)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

const INTERVAL: &str = "INTERVAL";

const DEFAULT_INTERVAL_SECS: u64 = 60;

pub fn get_default_interval() -> Duration {
    Duration::from_secs(DEFAULT_INTERVAL_SECS)
}

/// Reads `INTERVAL` (seconds). `Err` carries the raw value when it is not a
/// positive integer.
pub fn get_interval() -> Result<Duration, String> {
    match std::env::var(INTERVAL) {
        Err(_) => Ok(get_default_interval()),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(raw),
        },
    }
}

const LOG_LEVEL: &str = "LOG_LEVEL";

pub fn get_log_level() -> Result<LevelFilter, String> {
    match std::env::var(LOG_LEVEL) {
        Err(_) => Ok(LevelFilter::INFO),
        Ok(raw) => parse_level(&raw).ok_or(raw),
    }
}

pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Resolves on SIGINT or SIGTERM (ctrl-c only on non-unix platforms)
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
