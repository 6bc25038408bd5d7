//! smartbin-detect - camera-side detector
//!
//! Reads a capture device (or plays back a directory of stills), classifies
//! frames on operator command or on a fixed cadence, and sends each detected item to the hub. With `--serve`
//! the hub runs inside this process.

use anyhow::{Context, Result};
use clap::Parser;
use smartbin_common::config::{load_toml_config, validate_log_level};
use smartbin_detect::config::DetectConfig;
use smartbin_detect::control::spawn_console_control;
use smartbin_detect::{
    forward_items, load_classifier, open_source, Command, DetectionLoop, Enricher, HttpSink,
    LocalSink, LoopExit,
};
use smartbin_hub::server::{run, shutdown_signal};
use smartbin_hub::{AppState, BroadcastHub, IngestEndpoint};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for smartbin-detect
#[derive(Parser, Debug)]
#[command(name = "smartbin-detect")]
#[command(about = "Waste detector for the SmartBin pipeline")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/smartbin/smartbin-detect.toml)
    #[arg(short, long, env = "SMARTBIN_DETECT_CONFIG")]
    config: Option<PathBuf>,

    /// Capture device index (0, /dev/video0) or a directory of images
    #[arg(short, long, env = "SMARTBIN_SOURCE")]
    source: Option<String>,

    /// Model artifact (.onnx network or .json linear model)
    #[arg(short, long, env = "SMARTBIN_MODEL")]
    model: Option<PathBuf>,

    /// Hub ingestion URL
    #[arg(long, env = "SMARTBIN_HUB_URL")]
    hub_url: Option<String>,

    /// Host the hub in-process on this address, e.g. 0.0.0.0:5000
    #[arg(long, env = "SMARTBIN_SERVE")]
    serve: Option<String>,

    /// Frames between continuous detections
    #[arg(short, long, env = "SMARTBIN_DETECTION_INTERVAL")]
    interval: Option<u32>,

    /// Bin identifier stamped on every item
    #[arg(long, env = "SMARTBIN_BIN_ID")]
    bin_id: Option<String>,

    /// Seed for reproducible subtype and weight draws
    #[arg(long)]
    seed: Option<u64>,

    /// Restart the image directory when it runs out
    #[arg(long)]
    loop_source: bool,

    /// Do not mirror frames
    #[arg(long)]
    no_mirror: bool,
}

impl Args {
    fn apply(self, config: &mut DetectConfig) {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(url) = self.hub_url {
            config.hub_url = url;
        }
        if let Some(serve) = self.serve {
            config.serve = Some(serve);
        }
        if let Some(interval) = self.interval {
            config.detection_interval = interval;
        }
        if let Some(bin_id) = self.bin_id {
            config.bin_id = bin_id;
        }
        if self.loop_source {
            config.loop_source = true;
        }
        if self.no_mirror {
            config.mirror = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let seed = args.seed;

    let mut config: DetectConfig = load_toml_config(args.config.as_deref(), "smartbin-detect")
        .context("Failed to load config")?;
    args.apply(&mut config);
    validate_log_level(&config.logging.level)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "smartbin_detect={0},smartbin_hub={0},tower_http={0}",
                    config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting SmartBin Detector (smartbin-detect) v{} [{}] built {} ({}, features: {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
        env!("BUILD_FEATURES")
    );

    config.validate().context("Invalid configuration")?;

    let taxonomy = Arc::new(config.build_taxonomy()?);
    let model = load_classifier(&config.model_path, config.input_spec())
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;
    let source = open_source(&config.source, config.playback_options())
        .with_context(|| format!("Failed to open frame source {}", config.source))?;
    let enrich_options = config.enrich_options()?;
    let enricher = match seed {
        Some(seed) => {
            info!("Using fixed seed {}", seed);
            Enricher::seeded(taxonomy, enrich_options, seed)
        }
        None => Enricher::new(taxonomy, enrich_options),
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (item_tx, item_rx) = mpsc::channel(config.outbound_capacity);

    // Either host the hub here or post to a remote one
    let (server, mut stop_server, forwarder) = match config.serve_addr()? {
        Some(addr) => {
            let hub = Arc::new(BroadcastHub::new(config.subscriber_buffer));
            let sink = LocalSink::new(IngestEndpoint::new(Arc::clone(&hub)));
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let shutdown = async move {
                tokio::select! {
                    _ = shutdown_signal() => {},
                    _ = stop_rx => {},
                }
            };
            let server = tokio::spawn(run(addr, AppState::new(hub), shutdown));
            let forwarder = tokio::spawn(forward_items(sink, item_rx));
            (Some(server), Some(stop_tx), forwarder)
        }
        None => {
            let sink = HttpSink::new(config.hub_url.clone(), config.request_timeout())
                .context("Failed to build HTTP client")?;
            (None, None, tokio::spawn(forward_items(sink, item_rx)))
        }
    };

    let quit_tx = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit_tx.send(Command::Quit);
        }
    });
    spawn_console_control(command_tx).context("Failed to start console control")?;

    let detection = DetectionLoop::new(
        source,
        model,
        enricher,
        config.detection_interval,
        command_rx,
        item_tx,
    );
    let outcome = tokio::task::spawn_blocking(move || detection.run())
        .await
        .context("Detection loop panicked")?;

    // Loop is gone, so the forwarder drains what is left and stops
    let forwarded = forwarder.await.context("Item forwarder panicked")?;
    info!(
        "Forwarded {} items ({} failed)",
        forwarded.sent, forwarded.failed
    );

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!("Detection loop failed: {}", e);
            if let Some(stop) = stop_server {
                let _ = stop.send(());
            }
            return Err(e).context("Frame source failed");
        }
    };

    if let Some(server) = server {
        if report.exit == LoopExit::EndOfStream {
            info!("Frame source finished; hub still serving, press Ctrl+C to stop");
        } else if let Some(stop) = stop_server.take() {
            let _ = stop.send(());
        }
        let result = server.await;
        drop(stop_server);
        match result {
            Ok(result) => result.context("Hub server failed")?,
            Err(e) => warn!("Hub server task ended abnormally: {}", e),
        }
    }

    info!("smartbin-detect stopped ({:?})", report.exit);
    Ok(())
}
