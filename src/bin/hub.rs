use clap::Parser;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_monitoring::{
    Engine,
    config::{Config, StorageConfig, read_config_file},
    storage::open_backend,
    util::{get_config_path, get_db_path},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (falls back to UPTIME_CONFIG)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_monitoring", LevelFilter::DEBUG),
        ("uptime_hub", LevelFilter::TRACE),
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match args.file.or_else(get_config_path) {
        Some(path) => read_config_file(&path)?,
        None => {
            warn!("no config file given, using defaults");
            Config::default()
        }
    };

    let storage_config = storage_config(&config);
    let store = open_backend(&storage_config).await?;

    match store.health_check().await {
        Ok(health) => debug!("storage health: {health:?}"),
        Err(e) => error!("storage health check failed: {e}"),
    }

    let engine = Engine::start(
        store.clone(),
        &config.scheduler,
        storage_config.retention_days(),
    )
    .await?;

    if let Some(monitors) = config.monitors {
        for monitor in monitors {
            let name = monitor.name.clone();
            match engine.monitors().ensure(monitor).await {
                Ok((row, true)) => info!("seeded monitor {} ({})", row.slug, row.url),
                Ok((row, false)) => trace!("monitor {} already present", row.slug),
                Err(e) => error!("failed to seed monitor '{name}': {e}"),
            }
        }
    }

    match store.get_stats().await {
        Ok(stats) => info!("{stats}"),
        Err(e) => error!("failed to read storage stats: {e}"),
    }
    info!(
        "running {} probe job(s), press ctrl-c to stop",
        engine.registry().job_count().await
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    engine.shutdown().await
}

/// Storage settings with the UPTIME_DB_PATH override applied
fn storage_config(config: &Config) -> StorageConfig {
    let storage = config.storage.clone().unwrap_or_default();

    match (storage, get_db_path()) {
        (StorageConfig::Sqlite { retention_days, .. }, Some(path)) => {
            debug!("using database path from environment: {}", path.display());
            StorageConfig::Sqlite {
                path,
                retention_days,
            }
        }
        (storage, _) => storage,
    }
}
