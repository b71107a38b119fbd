//! Fleet monitor daemon.
//!
//! Polls every configured miner on a fixed interval until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use axewatch::cache::StatusCache;
use axewatch::config::Config;
use axewatch::fetch::{Fetch, HttpFetcher};
use axewatch::monitor::Monitor;
use axewatch::record::BestRecordStore;
use axewatch::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::load().context("failed to load configuration")?;
    info!(
        devices = config.devices.len(),
        interval_secs = config.update_interval_secs,
        data_dir = %config.data_dir.display(),
        "Starting axewatch"
    );

    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpFetcher::new().context("failed to build HTTP client")?);
    let cache = Arc::new(StatusCache::new(fetcher, config.device_ips()));
    let records = Arc::new(BestRecordStore::new(config.record_path()));

    match records.load().await {
        Some(record) => info!(record = %record, "Current best difficulty"),
        None => info!("No best difficulty recorded yet"),
    }

    let cancellation = CancellationToken::new();
    let monitor = Monitor::new(cache, records);
    let handle = tokio::spawn(monitor.run(config.update_interval(), cancellation.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");

    cancellation.cancel();
    handle.await.context("monitor task failed")?;

    Ok(())
}
