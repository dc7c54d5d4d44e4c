//! rabdap-id - identity cache service
//!
//! Serves identity lookups from the local cache, resolves misses against
//! the campus directory, and refreshes stale entries on a schedule.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rabdap_common::config::{resolve_config_path, ServiceConfig};
use rabdap_id::db::{self, SqliteCacheStore};
use rabdap_id::directory::{ClientSettings, DirectoryClient, LdapConnector};
use rabdap_id::sync::{spawn_refresh_scheduler, RefreshPipeline};
use rabdap_id::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rabdap-id
#[derive(Parser, Debug)]
#[command(name = "rabdap-id")]
#[command(about = "Identity cache backed by the campus directory")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(short, long, env = "RABDAP_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first: it carries the default log level
    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = ServiceConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification immediately after tracing init
    info!(
        "Starting rabdap-id v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match config_path.as_deref().filter(|path| path.exists()) {
        Some(path) => info!("Config: {}", path.display()),
        None => warn!("No config file found, using compiled defaults"),
    }
    if config.directory.password.is_none() {
        warn!("No directory password configured; binds will likely be rejected");
    }

    let db_path = &config.database.path;
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(db_path)
        .await
        .context("Failed to open database")?;
    let store = Arc::new(SqliteCacheStore::new(pool));

    let connector = Arc::new(LdapConnector::new(&config.directory));
    let directory = Arc::new(DirectoryClient::new(
        connector,
        ClientSettings::from(&config.directory),
    ));
    info!(
        "Directory: {} (throttle {} ms, idle timeout {} s)",
        config.directory.url, config.directory.throttle_ms, config.directory.idle_timeout_secs
    );

    let pipeline = Arc::new(RefreshPipeline::new(store, Arc::clone(&directory)));
    let scheduler = spawn_refresh_scheduler(Arc::clone(&pipeline), &config.refresh);

    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    if let Err(e) = directory.close().await {
        warn!("Directory close failed: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
