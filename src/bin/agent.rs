use std::process::ExitCode;

use fleetwatch::{
    agent::{Agent, AgentConfig, SysinfoCollector},
    util::shutdown_signal,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init(level: LevelFilter) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(level)
        .init();
}

/// Cancel `token` on SIGINT or SIGTERM
fn watch_signals(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping...");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init(LevelFilter::INFO);
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init(config.log_level);

    info!("API URL: {}", config.api_url);
    info!("Interval: {:?}", config.interval);

    let mut agent = match Agent::new(config, SysinfoCollector::new()) {
        Ok(agent) => agent,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    watch_signals(cancel.clone());

    agent.run(&cancel).await;
    ExitCode::SUCCESS
}
