//! Critical-condition alerts with a per-device cooldown.
//!
//! ```text
//!   condition true ──► never raised, or last raised > cooldown ago? ──► Alert
//!                                  │ no
//!                                  └──► suppressed
//! ```
//!
//! Each (device, kind) pair has its own cooldown. Offline alerts are
//! additionally debounced: a device must fail [`OFFLINE_AFTER_CHECKS`]
//! consecutive polls before it is reported.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::DeviceStatus;
use crate::tracing::prelude::*;

/// Minimum spacing between two alerts of the same kind for one device.
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

pub const OFFLINE_AFTER_CHECKS: u32 = 3;

/// ASIC temperature, °C.
pub const TEMP_CRITICAL: f64 = 75.0;

/// Voltage regulator temperature, °C.
pub const VR_TEMP_CRITICAL: f64 = 85.0;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertKind {
    Offline { checks: u32 },
    Temperature { celsius: f64 },
    VrTemperature { celsius: f64 },
}

impl AlertKind {
    fn key(&self) -> Key {
        match self {
            AlertKind::Offline { .. } => Key::Offline,
            AlertKind::Temperature { .. } => Key::Temperature,
            AlertKind::VrTemperature { .. } => Key::VrTemperature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Offline,
    Temperature,
    VrTemperature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub device: String,
    pub kind: AlertKind,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AlertKind::Offline { checks } => {
                write!(f, "{} is offline ({} failed checks)", self.device, checks)
            }
            AlertKind::Temperature { celsius } => {
                write!(f, "{} critical temperature: {}°C", self.device, celsius)
            }
            AlertKind::VrTemperature { celsius } => {
                write!(f, "{} critical VR temperature: {}°C", self.device, celsius)
            }
        }
    }
}

/// Turns successive device statuses into alerts.
#[derive(Debug)]
pub struct AlertTracker {
    cooldown: Duration,
    offline_counts: HashMap<String, u32>,
    last_raised: HashMap<(String, Key), Instant>,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new(ALERT_COOLDOWN)
    }
}

impl AlertTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            offline_counts: HashMap::new(),
            last_raised: HashMap::new(),
        }
    }

    /// Consecutive failed polls of `device` so far.
    pub fn offline_count(&self, device: &str) -> u32 {
        self.offline_counts.get(device).copied().unwrap_or(0)
    }

    /// Record one poll of `device` and return the alerts it raises.
    pub fn evaluate(&mut self, device: &str, status: &DeviceStatus) -> Vec<Alert> {
        let mut candidates = Vec::new();

        match status {
            Err(_) => {
                let count = self.offline_counts.entry(device.to_string()).or_default();
                *count += 1;
                if *count >= OFFLINE_AFTER_CHECKS {
                    candidates.push(AlertKind::Offline { checks: *count });
                }
            }
            Ok(status) => {
                self.offline_counts.remove(device);
                if status.temp >= TEMP_CRITICAL {
                    candidates.push(AlertKind::Temperature {
                        celsius: status.temp,
                    });
                }
                if status.vr_temp >= VR_TEMP_CRITICAL {
                    candidates.push(AlertKind::VrTemperature {
                        celsius: status.vr_temp,
                    });
                }
            }
        }

        let now = Instant::now();
        candidates
            .into_iter()
            .filter(|kind| {
                let key = (device.to_string(), kind.key());
                let cooled = self
                    .last_raised
                    .get(&key)
                    .is_none_or(|last| now.duration_since(*last) > self.cooldown);
                if cooled {
                    self.last_raised.insert(key, now);
                } else {
                    trace!(device, ?kind, "Alert suppressed by cooldown");
                }
                cooled
            })
            .map(|kind| Alert {
                device: device.to_string(),
                kind,
            })
            .collect()
    }
}
