//! smartbin-hub - item distribution service
//!
//! Receives detected items from the detector, caches the latest one, and
//! streams every new item to dashboards connected over SSE.

use anyhow::{Context, Result};
use clap::Parser;
use smartbin_common::config::{load_toml_config, validate_log_level};
use smartbin_hub::config::HubConfig;
use smartbin_hub::server::{run, shutdown_signal};
use smartbin_hub::{AppState, BroadcastHub};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for smartbin-hub
#[derive(Parser, Debug)]
#[command(name = "smartbin-hub")]
#[command(about = "Item distribution hub for the SmartBin dashboard")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/smartbin/smartbin-hub.toml)
    #[arg(short, long, env = "SMARTBIN_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:5000
    #[arg(short, long, env = "SMARTBIN_HUB_BIND")]
    bind: Option<String>,

    /// Items buffered per subscriber before it is disconnected
    #[arg(long, env = "SMARTBIN_SUBSCRIBER_BUFFER")]
    subscriber_buffer: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config: HubConfig =
        load_toml_config(args.config.as_deref(), "smartbin-hub").context("Failed to load config")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(buffer) = args.subscriber_buffer {
        config.subscriber_buffer = buffer;
    }
    validate_log_level(&config.logging.level)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("smartbin_hub={0},tower_http={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting SmartBin Hub (smartbin-hub) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let addr = config.socket_addr()?;
    let hub = Arc::new(BroadcastHub::new(config.subscriber_buffer));
    let state = AppState::new(hub);

    run(addr, state, shutdown_signal())
        .await
        .context("Hub server failed")?;

    Ok(())
}
