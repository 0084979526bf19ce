//! textlens - Live text-region annotation
//!
//! Captures video frames, runs text detection on them off the UI thread and
//! draws word and character outlines over the live preview.

mod app;
mod capture;
mod config;
mod overlay;
mod shared;
mod vision;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::capture::open_device;
use crate::config::AppConfig;
use crate::vision::{BlockingDetector, ContrastTextFinder, TextDetector};

/// textlens - Live text-region annotation
#[derive(Parser, Debug)]
#[command(name = "textlens")]
#[command(about = "Outline words and characters detected in a live video feed")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device: "test-pattern" or a directory of images
    #[arg(short, long)]
    device: Option<String>,

    /// Run without a window, logging detections
    #[arg(long)]
    headless: bool,

    /// Stop a headless run after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Maximum detections in flight (0 = unbounded)
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_or_default_config(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.capture.device = device;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        config.detection.max_in_flight = max_in_flight;
    }

    if let Some(path) = args.write_config {
        config::save_config(&config, &path)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        info!("Wrote configuration to {:?}", path);
        return Ok(());
    }

    info!("textlens starting...");

    let capture_config = capture::CaptureConfig::from(&config.capture);
    let device = open_device(&capture_config);
    let detector: Arc<dyn TextDetector> = Arc::new(
        BlockingDetector::new(
            ContrastTextFinder::new(config.detection.finder()),
            config.detection.worker_threads,
        )
        .context("Failed to start detection engine")?,
    );

    if args.headless {
        let duration = args.duration_secs.map(Duration::from_secs);
        view::run_headless(&config, device, detector, duration)?;
    } else {
        view::run_view(&config, device, detector)?;
    }

    info!("textlens shutdown complete");

    Ok(())
}

/// Load configuration from an explicit path, the default location, or defaults
fn load_or_default_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = config::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => tracing::warn!("Ignoring unreadable config: {:#}", e),
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}
