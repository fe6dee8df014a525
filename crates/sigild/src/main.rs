//! # sigild - Sigil pattern-lock host
//!
//! Serves pattern sessions over HTTP. Each session wraps one engine
//! [`Session`](sigil_engine::Session): clients post pointer events and get
//! frames and outcomes back. Created secrets are written to Redis.
//!
//! ## Architecture
//! ```text
//! Client → sigild → sigil-engine (recognizer + workflow)
//!            ↓
//!         Redis (secrets)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod reset;
mod routes;
mod secrets;
mod sessions;
mod state;

use config::AppConfig;
use state::AppState;

/// Sigil pattern-lock host daemon
#[derive(Parser, Debug)]
#[command(name = "sigild")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/sigild.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Pepper for the peppered-sha256 transform (overrides config)
    #[arg(long, env = "SIGIL_PEPPER", hide_env_values = true)]
    pepper: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting sigild v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        grid_size = config.engine.grid_size,
        transform = ?config.transform.kind,
        "Configuration loaded from {}",
        args.config
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let state = AppState::new(config.clone()).await?;
    info!("Redis connected: {}", config.redis_url);

    // Drop sessions nobody has touched for a while
    let reaper_sessions = state.sessions.clone();
    let reaper_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        sessions::session_reaper(reaper_sessions, reaper_shutdown).await;
    });

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("sigild listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("sigild shutdown complete");
    Ok(())
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
