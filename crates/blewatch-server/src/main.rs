//! # blewatch-server
//!
//! HTTP server for the blewatch Bluetooth LE discovery engine.
//!
//! This binary provides:
//! - REST API for the live device registry and scanner lifecycle
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, no radio
//! cargo run --package blewatch-server
//!
//! # With BlueZ
//! cargo run --package blewatch-server --features bluetooth
//!
//! # Production
//! BLEWATCH_ENV=production ./blewatch-server /etc/blewatch/config.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use blewatch_core::config::{default_config_path, Config};
use blewatch_server::state::AppState;
use blewatch_server::{api, event_log, logging};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::LogMode::from_env())?;

    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(default_config_path, PathBuf::from);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        heartbeat_timeout_secs = config.tracker.heartbeat_timeout_secs,
        "Starting blewatch-server"
    );

    let bind_ip: IpAddr = config
        .server
        .bind_address
        .parse()
        .context("Invalid server.bind_address")?;
    let addr = SocketAddr::new(bind_ip, config.server.port);
    let auto_start = config.server.auto_start;

    let state = AppState::from_config(config).await?;
    let _event_log = event_log::spawn(&state.tracker);

    if auto_start {
        state.auto_start().await?;
    }

    let app = api::create_router(state.clone());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = state.tracker.stop().await {
        error!(error = %e, "Failed to stop scanner cleanly");
    }
    info!("blewatch-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
