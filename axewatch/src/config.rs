//! Fleet configuration.
//!
//! A JSON file lists the devices; environment variables override or add
//! to it:
//!
//! ```json
//! {
//!   "update_interval_secs": 30,
//!   "data_dir": "/var/lib/axewatch",
//!   "devices": {
//!     "bitaxe-gamma": { "ip": "192.168.1.100", "temp_thresholds": "60,65,70" },
//!     "nerdqaxe": { "ip": "192.168.1.101" }
//!   }
//! }
//! ```
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `AXEWATCH_CONFIG` | path of the file (default `axewatch.json`) |
//! | `UPDATE_INTERVAL` | seconds between polling cycles |
//! | `AXEWATCH_DATA_DIR` | directory holding the best record |
//! | `DEVICE_<NAME>_IP` | add or re-address device `<name>` |
//! | `DEVICE_<NAME>_{TEMP,FAN,VOLT,VR_TEMP}_THRESHOLDS` | thresholds for it |
//!
//! `<NAME>` becomes the device name lowercased with `_` replaced by `-`,
//! so `DEVICE_BITAXE_GAMMA_IP` configures `bitaxe-gamma`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{Error, Result};
use crate::record::RECORD_FILE_NAME;
use crate::tracing::prelude::*;

pub const CONFIG_PATH_VAR: &str = "AXEWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "axewatch.json";

pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DATA_DIR: &str = "data";

pub const DEFAULT_TEMP_THRESHOLDS: &str = "60,65,70";
pub const DEFAULT_FAN_THRESHOLDS: &str = "0,2000,3500,7500";
pub const DEFAULT_VOLT_THRESHOLDS: &str = "0.95,1.1,1.3";
pub const DEFAULT_VR_TEMP_THRESHOLDS: &str = "65,75,80";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub update_interval_secs: u64,
    pub data_dir: PathBuf,
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            devices: BTreeMap::new(),
        }
    }
}

impl Config {
    /// File named by `AXEWATCH_CONFIG`, then the process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_file(&path)?;
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "No config file, using environment only");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let config: Self = serde_json::from_str(&contents).map_err(|e| Error::json(path, e))?;
        info!(path = %path.display(), devices = config.devices.len(), "Loaded configuration");
        Ok(config)
    }

    /// Overlay environment variables onto the file settings.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();

        if let Some(value) = vars.get("UPDATE_INTERVAL").filter(|v| !v.is_empty()) {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.update_interval_secs = secs,
                _ => warn!(
                    value = %value,
                    "Invalid UPDATE_INTERVAL, keeping {}s",
                    self.update_interval_secs
                ),
            }
        }

        if let Some(dir) = vars.get("AXEWATCH_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        for (key, ip) in &vars {
            let Some(raw_name) = key
                .strip_prefix("DEVICE_")
                .and_then(|rest| rest.strip_suffix("_IP"))
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            let name = raw_name.to_lowercase().replace('_', "-");
            let threshold =
                |setting: &str| vars.get(&format!("DEVICE_{raw_name}_{setting}")).cloned();

            let device = self.devices.entry(name.clone()).or_default();
            device.ip = ip.clone();
            if let Some(value) = threshold("TEMP_THRESHOLDS") {
                device.temp_thresholds = value;
            }
            if let Some(value) = threshold("FAN_THRESHOLDS") {
                device.fan_thresholds = value;
            }
            if let Some(value) = threshold("VOLT_THRESHOLDS") {
                device.volt_thresholds = value;
            }
            if let Some(value) = threshold("VR_TEMP_THRESHOLDS") {
                device.vr_temp_thresholds = value;
            }
            debug!(device = %name, ip = %ip, "Device configured from environment");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(Error::Config(
                "no devices configured (config file or DEVICE_<NAME>_IP)".to_string(),
            ));
        }
        if self.update_interval_secs == 0 {
            return Err(Error::Config("update interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(RECORD_FILE_NAME)
    }

    /// Device name to address pairs, as the status cache takes them.
    pub fn device_ips(&self) -> impl Iterator<Item = (&str, &str)> {
        self.devices
            .iter()
            .map(|(name, device)| (name.as_str(), device.ip.as_str()))
    }
}

/// One miner. Threshold fields are comma-separated numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub ip: String,
    pub temp_thresholds: String,
    pub fan_thresholds: String,
    pub volt_thresholds: String,
    pub vr_temp_thresholds: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            temp_thresholds: DEFAULT_TEMP_THRESHOLDS.to_string(),
            fan_thresholds: DEFAULT_FAN_THRESHOLDS.to_string(),
            volt_thresholds: DEFAULT_VOLT_THRESHOLDS.to_string(),
            vr_temp_thresholds: DEFAULT_VR_TEMP_THRESHOLDS.to_string(),
        }
    }
}

impl DeviceConfig {
    pub fn temp_levels(&self) -> Thresholds {
        Thresholds::parse_or_default(&self.temp_thresholds, DEFAULT_TEMP_THRESHOLDS)
    }

    pub fn fan_levels(&self) -> Thresholds {
        Thresholds::parse_or_default(&self.fan_thresholds, DEFAULT_FAN_THRESHOLDS)
    }

    pub fn volt_levels(&self) -> Thresholds {
        Thresholds::parse_or_default(&self.volt_thresholds, DEFAULT_VOLT_THRESHOLDS)
    }

    pub fn vr_temp_levels(&self) -> Thresholds {
        Thresholds::parse_or_default(&self.vr_temp_thresholds, DEFAULT_VR_TEMP_THRESHOLDS)
    }
}

/// Traffic-light rating of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Ok,
    Warn,
    Critical,
}

/// Ordered bounds for classifying a reading. A bound that is not
/// configured never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    fn parse_or_default(text: &str, default: &str) -> Self {
        text.parse().unwrap_or_else(|e| {
            warn!(thresholds = text, error = %e, "Invalid thresholds, using defaults");
            Self::builtin(default)
        })
    }

    fn builtin(text: &str) -> Self {
        Self(text.split(',').filter_map(|t| t.parse().ok()).collect())
    }

    pub fn bounds(&self) -> &[f64] {
        &self.0
    }

    /// Higher is worse: below `t0` ok, below `t1` warn, else critical.
    pub fn rising(&self, value: f64) -> Level {
        if self.0.first().is_none_or(|&t| value < t) {
            Level::Ok
        } else if self.0.get(1).is_none_or(|&t| value < t) {
            Level::Warn
        } else {
            Level::Critical
        }
    }

    /// Lower is worse: at or below `t0` critical, at or below `t1` warn.
    pub fn falling(&self, value: f64) -> Level {
        if self.0.first().is_some_and(|&t| value <= t) {
            Level::Critical
        } else if self.0.get(1).is_some_and(|&t| value <= t) {
            Level::Warn
        } else {
            Level::Ok
        }
    }

    /// Only the upper bounds matter: at or above `t2` critical, at or
    /// above `t1` warn.
    pub fn upper(&self, value: f64) -> Level {
        if self.0.get(2).is_some_and(|&t| value >= t) {
            Level::Critical
        } else if self.0.get(1).is_some_and(|&t| value >= t) {
            Level::Warn
        } else {
            Level::Ok
        }
    }
}

impl FromStr for Thresholds {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bounds = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|bound| bound.is_finite())
                    .ok_or_else(|| Error::Config(format!("invalid threshold {part:?} in {s:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(bounds))
    }
}
