//! Agency Sheets Bot - Main Entry Point
//!
//! Telegram bot for a design agency that records orders, payments and
//! expenses in a Google spreadsheet.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use agency_sheets_bot::access::AccessGate;
use agency_sheets_bot::cache::{CacheSyncer, SyncMessage, SyncStatus};
use agency_sheets_bot::commands::CommandHandler;
use agency_sheets_bot::config::Settings;
use agency_sheets_bot::dispatcher::Dispatcher;
use agency_sheets_bot::sheets::Ledger;
use agency_sheets_bot::startup::{self, Startup};

/// Directory receiving the daily log files.
const LOG_DIR: &str = "logs";

/// Telegram bot for agency bookkeeping in Google Sheets.
#[derive(Parser, Debug)]
#[command(name = "agency_bot")]
#[command(about = "Record agency orders, payments and expenses in Google Sheets")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let settings = Settings::from_env().context("Failed to load configuration from environment")?;
    info!("Loaded settings, cache at {}", settings.cache_db_path.display());

    let Startup {
        settings,
        bot,
        me,
        sheets,
        spreadsheet,
        cache,
    } = startup::run_checks(settings)
        .await
        .context("Startup checks failed")?;

    info!(
        "Connected: @{} -> '{}'",
        me.username.as_deref().unwrap_or("unknown"),
        spreadsheet.title
    );

    let bot = Arc::new(bot);
    let ledger = Arc::new(Ledger::new(sheets));
    let cache = Arc::new(cache);
    let status = Arc::new(RwLock::new(SyncStatus::new()));

    let (sync_tx, sync_rx) = mpsc::channel::<SyncMessage>(32);

    let syncer = Arc::new(CacheSyncer::new(
        Arc::clone(&ledger),
        Arc::clone(&cache),
        status,
        settings.cache_sync_interval(),
    ));

    let handler = Arc::new(
        CommandHandler::new(Arc::clone(&ledger), Arc::clone(&cache), Arc::clone(&syncer))
            .with_bot_username(me.username.clone()),
    );

    let gate = AccessGate::new(settings.admin_ids.clone());
    info!("{} user(s) may use the bot", gate.allowed_count());

    let dispatcher = Dispatcher::new(
        Arc::clone(&bot),
        gate,
        handler,
        sync_tx.clone(),
    );
    dispatcher.publish_commands().await;

    let syncer_handle = {
        let syncer = Arc::clone(&syncer);
        tokio::spawn(async move {
            syncer.run(sync_rx).await;
        })
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}; stop the process to exit", e);
            // Dropping the sender would end polling.
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
        let _ = shutdown_tx.send(true);
    });

    info!("Bot is running. Use Ctrl+C to stop.");
    let polling = dispatcher.run(shutdown_rx).await;

    info!("Shutting down...");
    let _ = sync_tx.send(SyncMessage::Shutdown).await;
    let _ = syncer_handle.await;
    cache.close().await;

    polling.context("Polling stopped")?;
    Ok(())
}

/// Initializes console and daily-rolling file logging.
///
/// `RUST_LOG` takes precedence over `level`. The returned guard flushes the
/// file writer on drop.
fn init_logging(level: &str) -> WorkerGuard {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "agency_bot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(filter()),
        )
        .init();

    guard
}
