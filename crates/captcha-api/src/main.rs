//! # CAPTCHA API
//!
//! Issues and validates CAPTCHA challenges over a versioned REST API, and
//! runs an hourly cleanup of old challenges through a Redis-backed task
//! worker.
//!
//! ## Architecture
//! ```text
//! Proxy → captcha-api serve → SQLite
//!                  ↓ (enqueue)
//!               Redis ← captcha-api worker (consumer + hourly beat)
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod app;
mod captcha;
mod config;
mod db;
mod proxy;
mod routes;
mod state;
mod tasks;

use app::AppOptions;
use captcha_common::constants::DEFAULT_CONFIG_PATH;
use tasks::TaskRunner;

/// CAPTCHA API server and task worker
#[derive(Parser, Debug)]
#[command(name = "captcha-api")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override a configuration key (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Ignore the CAPTCHA_API_CONFIG overlay
    #[arg(long, default_value = "false")]
    no_env_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Serve the HTTP API (default)
    #[default]
    Serve,
    /// Consume queued tasks and run the hourly scheduler
    Worker,
}

impl Args {
    fn app_options(&self) -> AppOptions {
        let mut overrides = self.overrides.clone();
        if let Some(ref listen) = self.listen {
            overrides.push(("LISTEN_ADDR".to_string(), listen.clone()));
        }

        AppOptions {
            config_path: self.config.clone(),
            use_env_config: !self.no_env_config,
            overrides,
            database: None,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting CAPTCHA API v{}", env!("CARGO_PKG_VERSION"));

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Shutdown signal received");
        let _ = signal_tx.send(());
    });

    match args.command.unwrap_or_default() {
        Command::Serve => serve(args.app_options(), shutdown_tx).await?,
        Command::Worker => worker(args.app_options(), shutdown_tx).await?,
    }

    info!("CAPTCHA API shutdown complete");
    Ok(())
}

async fn serve(options: AppOptions, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let application = app::create_app(options).await?;
    let listen_addr = application.state.settings().listen_addr.clone();

    // Build router
    let router = application.router();

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening on {}", listen_addr);

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
    })
    .await
    .context("Server error")
}

async fn worker(options: AppOptions, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let context = app::create_context(&options).await?;

    let runner = TaskRunner::configure(&context.config).context("Failed to configure task runner")?;

    tasks::worker::run_worker(Arc::new(runner), context, shutdown_tx).await
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
