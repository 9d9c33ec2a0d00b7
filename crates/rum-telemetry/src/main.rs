//! Standalone uploader for a RUM batch directory.
//!
//! Drains batch files written by a [`rum_telemetry::RumMonitor`] to the
//! configured collector until interrupted.
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: `rum-telemetry.toml` in the working directory
//! 3. `RUM_APPLICATION_ID`, `RUM_CLIENT_TOKEN`, `RUM_ENDPOINT`, `RUM_BATCH_DIRECTORY`
//! 4. Environment variables with `RUM_` prefix, sections separated by `__`
//!
//! # Environment Variables
//!
//! - `RUM_ENDPOINT` - collector intake URL
//! - `RUM_CLIENT_TOKEN` - client token sent with every request
//! - `RUM_UPLOADER__COMPRESSION` - `none` or `gzip`
//! - `RUM_DELAY__MAX` - maximum polling interval in milliseconds

use anyhow::{Context, Result};
use rum_telemetry::{
    Config, Delay, FileStorage, HttpUploader, StaticSignalProvider, UploadConditions, UploadCycle,
    UploadWorker,
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config = Config::load().context("failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let storage = FileStorage::open(config.storage.clone()).context("failed to open batch directory")?;
    let uploader = HttpUploader::new(config.uploader.clone()).context("failed to create uploader")?;
    tracing::info!(
        directory = %storage.path().display(),
        endpoint = uploader.endpoint(),
        "Starting upload worker"
    );

    let cycle = UploadCycle::new(
        Box::new(storage.reader()),
        Box::new(uploader),
        UploadConditions::new(
            Arc::new(StaticSignalProvider::always_ready()),
            &config.conditions,
        ),
        Delay::new(&config.delay),
        &config.uploader.feature_name,
    );
    let mut worker = UploadWorker::spawn(cycle);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for the current cycle");
    worker.cancel_synchronously().await;

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rum_telemetry=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .context("failed to initialise tracing registry")?;

    Ok(())
}
