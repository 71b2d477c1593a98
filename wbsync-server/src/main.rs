//! wbsync-server - Wildberries product sync service
//!
//! Serves product cards from a local SQLite database, fetching them from the
//! Wildberries catalog on first request and refreshing subscribed products
//! on a fixed interval. Optionally answers the same lookups through a
//! Telegram bot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wbsync_common::config::{BootstrapOverrides, TomlConfig};
use wbsync_server::bot::TelegramBot;
use wbsync_server::catalog::{CatalogClient, RetryPolicy, WildberriesSource};
use wbsync_server::db::ProductStore;
use wbsync_server::scheduler::RefreshScheduler;
use wbsync_server::sync::Synchronizer;
use wbsync_server::{build_router, AppState};

/// Command-line arguments for wbsync-server
#[derive(Parser, Debug)]
#[command(name = "wbsync-server")]
#[command(about = "Wildberries product sync service")]
#[command(version)]
struct Args {
    /// TOML configuration file (default: ~/.config/wbsync/config.toml)
    #[arg(short, long, env = "WBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "WBSYNC_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "WBSYNC_DATABASE")]
    database: Option<PathBuf>,

    /// Telegram bot token; the bot stays off without one
    #[arg(long, env = "WBSYNC_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(BootstrapOverrides {
        port: args.port,
        database_path: args.database,
        bot_token: args.bot_token,
    });

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wbsync-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = wbsync_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let store = ProductStore::new(pool.clone());

    let source = WildberriesSource::new(&config.catalog.base_url, config.catalog.timeout())
        .context("Failed to build catalog HTTP client")?;
    let policy = RetryPolicy::new(config.catalog.max_attempts, config.catalog.retry_delay());
    let catalog = CatalogClient::new(Arc::new(source), policy);
    info!(
        base_url = %config.catalog.base_url,
        max_attempts = policy.max_attempts,
        retry_delay_secs = policy.delay.as_secs(),
        "Catalog client ready"
    );

    let sync = Synchronizer::new(store, catalog);

    let scheduler = RefreshScheduler::new(sync.clone(), config.scheduler.refresh_interval());
    let restored = scheduler
        .start()
        .await
        .context("Failed to start refresh scheduler")?;
    info!("Restored {} subscription(s)", restored);

    let bot_shutdown = CancellationToken::new();
    let bot_task = match config.bot.token.as_deref() {
        Some(token) if !token.trim().is_empty() => {
            let bot = TelegramBot::new(token, sync.clone()).context("Failed to build Telegram bot")?;
            Some(bot.start(bot_shutdown.clone()))
        }
        _ => {
            info!("No bot token configured, Telegram bot disabled");
            None
        }
    };

    let app = build_router(AppState::new(sync, scheduler.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    bot_shutdown.cancel();
    if let Some(task) = bot_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Telegram bot task ended abnormally");
        }
    }
    scheduler.shutdown().await;
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
