//! Periodic polling cycle.
//!
//! Each cycle runs three steps in order:
//!
//! ```text
//!  StatusCache::get_all_devices ──► BestRecordStore::check_status ──► AlertTracker::evaluate
//!      (concurrent fetches)            (per device, name order)         (per device)
//! ```
//!
//! Every fetch has finished before any record is checked, so a cycle sees
//! one consistent snapshot of the fleet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::alert::{Alert, AlertTracker};
use crate::cache::{DeviceStatus, StatusCache};
use crate::record::BestRecordStore;
use crate::tracing::prelude::*;

/// A device that set a new all-time best this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub device: String,
    pub formatted: String,
}

/// Everything one cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub statuses: BTreeMap<String, DeviceStatus>,
    pub new_records: Vec<NewRecord>,
    pub alerts: Vec<Alert>,
}

impl CycleReport {
    pub fn online(&self) -> usize {
        self.statuses.values().filter(|s| s.is_ok()).count()
    }
}

pub struct Monitor {
    cache: Arc<StatusCache>,
    records: Arc<BestRecordStore>,
    alerts: AlertTracker,
}

impl Monitor {
    pub fn new(cache: Arc<StatusCache>, records: Arc<BestRecordStore>) -> Self {
        Self::with_alerts(cache, records, AlertTracker::default())
    }

    pub fn with_alerts(
        cache: Arc<StatusCache>,
        records: Arc<BestRecordStore>,
        alerts: AlertTracker,
    ) -> Self {
        Self {
            cache,
            records,
            alerts,
        }
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let statuses = self.cache.get_all_devices().await;

        let mut new_records = Vec::new();
        for (device, status) in &statuses {
            let Ok(status) = status else { continue };
            let update = self.records.check_status(status).await;
            if let Some(formatted) = update.formatted.filter(|_| update.is_new_record) {
                new_records.push(NewRecord {
                    device: device.clone(),
                    formatted,
                });
            }
        }

        let alerts = statuses
            .iter()
            .flat_map(|(device, status)| self.alerts.evaluate(device, status))
            .collect();

        CycleReport {
            statuses,
            new_records,
            alerts,
        }
    }

    /// Poll every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    let report = self.run_cycle().await;
                    log_report(&report);
                }
            }
        }

        debug!("Monitor stopped");
    }
}

fn log_report(report: &CycleReport) {
    for (device, status) in &report.statuses {
        match status {
            Ok(status) => debug!(
                device = %device,
                hash_rate = status.hash_rate,
                temp = status.temp,
                best_diff = %status.best_diff,
                "Device status"
            ),
            Err(e) => warn!(device = %device, error = %e, "Device unreachable"),
        }
    }

    for record in &report.new_records {
        info!(device = %record.device, value = %record.formatted, "New best difficulty record");
    }

    for alert in &report.alerts {
        warn!(device = %alert.device, "{alert}");
    }

    info!(
        online = report.online(),
        devices = report.statuses.len(),
        "Polling cycle complete"
    );
}
