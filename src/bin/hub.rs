use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetwatch::{
    actors::ProberHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Config, StorageConfig, read_config_file},
    metrics::MetricsService,
    monitors::Prober,
    storage::{MemoryBackend, NewEndpoint, StorageBackend, sqlite::SqliteBackend},
    util::{parse_level, shutdown_signal},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", level),
        ("fleetwatch_hub", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.clone().unwrap_or_default() {
        StorageConfig::Sqlite { path } => {
            let backend = SqliteBackend::new(&path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Arc::new(backend))
        }
        StorageConfig::None => {
            warn!("storage backend is \"none\", samples are kept in memory only");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

/// Register configured endpoints that aren't known yet (matched by address)
#[instrument(skip_all)]
async fn seed_endpoints(storage: &dyn StorageBackend, config: &Config) -> anyhow::Result<()> {
    let known = storage.list_endpoints().await?;

    for endpoint in &config.endpoints {
        if known.iter().any(|e| e.address == endpoint.address) {
            trace!("endpoint {} already registered", endpoint.address);
            continue;
        }

        let created = storage
            .insert_endpoint(NewEndpoint::new(&endpoint.name, &endpoint.address))
            .await?;
        info!("registered endpoint {} ({})", created.name, created.address);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = parse_level(&args.log_level)
        .with_context(|| format!("unknown log level {:?}", args.log_level))?;
    init(level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let storage = open_storage(&config).await?;
    seed_endpoints(storage.as_ref(), &config).await?;
    info!("{}", storage.get_stats().await?);

    let cancel = CancellationToken::new();

    let prober = Prober::new(storage.clone(), &config.prober);
    let prober = ProberHandle::spawn(prober, config.prober.interval(), cancel.child_token());

    let metrics = Arc::new(MetricsService::new(storage.clone(), config.retention()));
    let state = ApiState::new(metrics, prober.clone());

    let (addr, server) =
        spawn_api_server(ApiConfig::from(&config.api), state, cancel.child_token()).await?;
    info!("hub ready on {addr}");

    shutdown_signal().await;
    info!("shutdown signal received, stopping...");

    cancel.cancel();
    if let Err(e) = prober.shutdown(config.prober.shutdown_grace()).await {
        warn!("prober did not shut down cleanly: {e:#}");
    }
    if let Err(e) = server.await {
        warn!("API server task failed: {e}");
    }
    storage.close().await?;

    info!("hub stopped");
    Ok(())
}
