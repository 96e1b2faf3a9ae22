//! riverstat-agg - Main entry point
//!
//! Detection statistics aggregation service: ingests detection batches over
//! HTTP and serves live, rollup and log views plus an SSE event stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use riverstat_agg::retention::spawn_retention_task;
use riverstat_agg::store::{AggregateStore, MemoryStore, SqliteStore};
use riverstat_agg::{build_router, AppState, StatsEngine};
use riverstat_common::config::{load_config, resolve_config_path};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for riverstat-agg
#[derive(Parser, Debug)]
#[command(name = "riverstat-agg")]
#[command(about = "Detection statistics aggregation service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "RIVERSTAT_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "RIVERSTAT_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "RIVERSTAT_PORT")]
    port: Option<u16>,

    /// SQLite database file (in-memory store when unset)
    #[arg(short, long, env = "RIVERSTAT_DATABASE")]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RIVERSTAT_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured log level is not known yet; config loading logs at info
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .finish();
    let (config_path, mut config) = tracing::subscriber::with_default(bootstrap, || {
        let path = resolve_config_path(args.config.as_deref());
        load_config(path.as_deref()).map(|config| (path, config))
    })
    .context("Failed to load configuration")?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "riverstat_agg={level},riverstat_common={level},tower_http=info",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting riverstat-agg v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    let store: Arc<dyn AggregateStore> = match &config.database_path {
        Some(path) => Arc::new(
            SqliteStore::open(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?,
        ),
        None => {
            info!("No database_path configured, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let engine = StatsEngine::new(store, &config);
    info!(storage = engine.store.backend(), "Aggregation engine initialized");

    let shutdown = CancellationToken::new();
    let retention = spawn_retention_task(
        engine.rollups.clone(),
        config.retention.clone(),
        shutdown.clone(),
    );

    let app = build_router(AppState::new(engine));

    info!("Starting HTTP server on {}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = retention {
        let _ = handle.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
