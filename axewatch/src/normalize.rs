//! Canonical device status.
//!
//! Bitaxe (single ASIC) and NerdAxe (multi ASIC) firmware both serve
//! `/api/system/info`, but with different and partly renamed field sets.
//! [`normalize`] folds either shape into one [`CanonicalStatus`] with every
//! field present.
//!
//! # Field resolution
//!
//! Each canonical field names its source with an explicit [`Lookup`]:
//!
//! - [`Lookup::Path`] descends nested objects, e.g. `stratum` → `poolMode`.
//!   A missing step, or a step that is not an object, fails the lookup.
//! - [`Lookup::Alternatives`] tries top-level keys in order, e.g. `macAddr`
//!   then `mac`, and takes the first one present.
//!
//! A lookup that fails, or that finds `null`, `""`, `false`, `0`, `[]`,
//! `{}`, or a value of the wrong JSON type, leaves the field at its
//! default.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::fetch::FetchError;

/// Where a canonical field finds its value in a raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'k> {
    /// Nested keys, outermost first.
    Path(&'k [&'k str]),
    /// Top-level keys in order of preference.
    Alternatives(&'k [&'k str]),
}

impl Lookup<'_> {
    pub fn resolve<'v>(&self, data: &'v Map<String, Value>) -> Option<&'v Value> {
        match *self {
            Lookup::Path(keys) => resolve_path(data, keys),
            Lookup::Alternatives(keys) => resolve_alternatives(data, keys),
        }
    }
}

/// Follow `keys` through nested objects.
pub fn resolve_path<'v>(data: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    let (first, rest) = keys.split_first()?;
    rest.iter()
        .try_fold(data.get(*first)?, |current, key| current.as_object()?.get(*key))
}

/// Value of the first of `keys` present at the top level.
pub fn resolve_alternatives<'v>(data: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|key| data.get(*key))
}

/// Device status in the shape shared by every device family.
///
/// Serializes with the AxeOS key names. Numeric fields default to zero,
/// flags to `false`, lists to empty; text defaults are noted per field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalStatus {
    // Identity. `hostname` falls back to the configured device name.
    pub hostname: String,
    /// Default `"N/A"`.
    #[serde(rename = "deviceID")]
    pub device_id: String,
    /// Default `"N/A"`.
    pub ip: String,
    /// Default `"N/A"`.
    pub mac: String,

    // Power
    pub power: f64,
    pub power_limit: f64,
    pub max_power: f64,
    pub min_power: f64,
    /// Input voltage in mV.
    pub voltage: f64,
    pub current: f64,
    pub max_voltage: f64,
    pub min_voltage: f64,
    pub nominal_voltage: f64,

    // Hash rate in GH/s
    pub hash_rate: f64,
    #[serde(rename = "hashRate_1m")]
    pub hash_rate_1m: f64,
    #[serde(rename = "hashRate_10m")]
    pub hash_rate_10m: f64,
    #[serde(rename = "hashRate_1h")]
    pub hash_rate_1h: f64,
    #[serde(rename = "hashRate_1d")]
    pub hash_rate_1d: f64,
    pub expected_hashrate: f64,

    // Temperatures in °C
    pub temp: f64,
    pub vr_temp: f64,
    #[serde(rename = "temptarget")]
    pub temp_target: f64,
    #[serde(rename = "overheat_temp")]
    pub overheat_temp: f64,

    // Shares. The difficulty strings default to `"-"`.
    pub best_diff: String,
    pub best_session_diff: String,
    pub best_diff_time: String,
    pub pool_difficulty: u64,
    pub stratum_difficulty: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub shares_rejected_reasons: Vec<Value>,

    // ASIC voltage (mV) and clock (MHz)
    pub core_voltage: f64,
    pub default_core_voltage: f64,
    pub core_voltage_actual: f64,
    pub core_voltage_set: f64,
    pub frequency: f64,

    // Wi-Fi. Text defaults `"-"`.
    pub ssid: String,
    pub wifi_status: String,
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: i64,

    // Hardware. Text defaults `"Unknown"`.
    #[serde(rename = "ASICModel")]
    pub asic_model: String,
    pub device_model: String,
    pub asic_count: u64,
    pub small_core_count: u64,

    // Fan
    pub fanspeed: f64,
    pub fanrpm: u64,
    pub manual_fan_speed: f64,

    // Firmware. Version strings default `"N/A"`, `boardVersion` `"Unknown"`.
    pub uptime_seconds: u64,
    pub free_heap: u64,
    pub free_heap_int: u64,
    pub version: String,
    #[serde(rename = "axeOSVersion")]
    pub axe_os_version: String,
    pub idf_version: String,
    pub board_version: String,

    // Pool connection. Text defaults `"-"`; ports are kept as text.
    #[serde(rename = "stratumURL")]
    pub stratum_url: String,
    pub stratum_port: String,
    pub stratum_user: String,
    #[serde(rename = "fallbackStratumURL")]
    pub fallback_stratum_url: String,
    pub fallback_stratum_port: String,
    pub fallback_stratum_user: String,
    pub is_using_fallback_stratum: bool,

    // NerdAxe extensions. Text defaults `"N/A"`.
    #[serde(rename = "duplicateHWNonces")]
    pub duplicate_hw_nonces: u64,
    pub found_blocks: u64,
    pub total_found_blocks: u64,
    pub default_frequency: f64,
    pub vr_frequency: f64,
    pub default_vr_frequency: f64,
    pub job_interval: u64,
    pub last_reset_reason: String,
    pub running_partition: String,
    pub pid_p: f64,
    pub pid_i: f64,
    pub pid_d: f64,

    // NerdAxe nested `stratum` object. Modes default `"-"`.
    #[serde(rename = "stratum_poolMode")]
    pub stratum_pool_mode: String,
    #[serde(rename = "stratum_activePoolMode")]
    pub stratum_active_pool_mode: String,
    #[serde(rename = "stratum_poolBalance")]
    pub stratum_pool_balance: f64,
    #[serde(rename = "stratum_totalBestDiff")]
    pub stratum_total_best_diff: f64,
    #[serde(rename = "stratum_poolDifficulty")]
    pub stratum_pool_difficulty: f64,

    // Switches
    #[serde(rename = "overheat_mode")]
    pub overheat_mode: bool,
    #[serde(rename = "autofanspeed")]
    pub auto_fan_speed: bool,
    #[serde(rename = "invertfanpolarity")]
    pub invert_fan_polarity: bool,
    #[serde(rename = "flipscreen")]
    pub flip_screen: bool,
    #[serde(rename = "invertscreen")]
    pub invert_screen: bool,
}

impl CanonicalStatus {
    /// Whether this is the extended (NerdAxe) family.
    ///
    /// Only NerdAxe firmware reports a VR clock or a job interval, so
    /// either being non-zero identifies it. Presentation uses this to
    /// decide which extended metrics to show; normalization fills every
    /// field regardless.
    pub fn is_extended(&self) -> bool {
        self.vr_frequency > 0.0 || self.job_interval > 0
    }

    /// Hashing efficiency in GH/W, zero when no power is reported.
    pub fn efficiency(&self) -> f64 {
        if self.power > 0.0 {
            self.hash_rate / self.power
        } else {
            0.0
        }
    }
}

/// Map a raw payload onto the canonical shape.
///
/// A payload carrying an `"error"` key is returned as that error. Anything
/// else succeeds: fields that cannot be resolved take their defaults, and
/// a payload that is not a JSON object is treated as an empty one.
pub fn normalize(raw: &Value, fallback_hostname: &str) -> Result<CanonicalStatus, FetchError> {
    let empty = Map::new();
    let data = raw.as_object().unwrap_or(&empty);

    if let Some(marker) = data.get("error") {
        return Err(match marker {
            Value::String(text) => FetchError::from_marker(text),
            other => FetchError::from_marker(&other.to_string()),
        });
    }

    use Lookup::{Alternatives as Alt, Path};
    let f = Fields(data);

    Ok(CanonicalStatus {
        hostname: f.text(Alt(&["hostname"]), fallback_hostname),
        device_id: f.text(Alt(&["deviceID"]), "N/A"),
        ip: f.text(Alt(&["ip", "hostip"]), "N/A"),
        mac: f.text(Alt(&["macAddr", "mac"]), "N/A"),

        power: f.float(Alt(&["power"])),
        power_limit: f.float(Alt(&["powerLimit"])),
        max_power: f.float(Alt(&["maxPower"])),
        min_power: f.float(Alt(&["minPower"])),
        voltage: f.float(Alt(&["voltage"])),
        current: f.float(Alt(&["current"])),
        max_voltage: f.float(Alt(&["maxVoltage"])),
        min_voltage: f.float(Alt(&["minVoltage"])),
        nominal_voltage: f.float(Alt(&["nominalVoltage"])),

        hash_rate: f.float(Alt(&["hashRate"])),
        hash_rate_1m: f.float(Alt(&["hashRate_1m"])),
        hash_rate_10m: f.float(Alt(&["hashRate_10m"])),
        hash_rate_1h: f.float(Alt(&["hashRate_1h"])),
        hash_rate_1d: f.float(Alt(&["hashRate_1d"])),
        expected_hashrate: f.float(Alt(&["expectedHashrate"])),

        temp: f.float(Alt(&["temp"])),
        vr_temp: f.float(Alt(&["vrTemp"])),
        temp_target: f.float(Alt(&["temptarget", "pidTargetTemp"])),
        overheat_temp: f.float(Alt(&["overheat_temp"])),

        best_diff: f.text(Alt(&["bestDiff"]), "-"),
        best_session_diff: f.text(Alt(&["bestSessionDiff"]), "-"),
        best_diff_time: f.text(Alt(&["bestDiffTime"]), "-"),
        pool_difficulty: f.count(Alt(&["poolDifficulty"])),
        stratum_difficulty: f.count(Alt(&["stratumDifficulty"])),
        shares_accepted: f.count(Alt(&["sharesAccepted"])),
        shares_rejected: f.count(Alt(&["sharesRejected"])),
        shares_rejected_reasons: f.list(Alt(&["sharesRejectedReasons"])),

        core_voltage: f.float(Alt(&["coreVoltage"])),
        default_core_voltage: f.float(Alt(&["defaultCoreVoltage"])),
        core_voltage_actual: f.float(Alt(&["coreVoltageActual", "coreVoltageActualMV"])),
        core_voltage_set: f.float(Alt(&["coreVoltageSet"])),
        frequency: f.float(Alt(&["frequency"])),

        ssid: f.text(Alt(&["ssid"]), "-"),
        wifi_status: f.text(Alt(&["wifiStatus"]), "-"),
        wifi_rssi: f.signed(Alt(&["wifiRSSI"])),

        asic_model: f.text(Alt(&["ASICModel"]), "Unknown"),
        device_model: f.text(Alt(&["deviceModel", "boardVersion"]), "Unknown"),
        asic_count: f.count(Alt(&["asicCount"])),
        small_core_count: f.count(Alt(&["smallCoreCount"])),

        fanspeed: f.float(Alt(&["fanspeed"])),
        fanrpm: f.count(Alt(&["fanrpm"])),
        manual_fan_speed: f.float(Alt(&["manualFanSpeed"])),

        uptime_seconds: f.count(Alt(&["uptimeSeconds"])),
        free_heap: f.count(Alt(&["freeHeap"])),
        free_heap_int: f.count(Alt(&["freeHeapInt"])),
        version: f.text(Alt(&["version"]), "N/A"),
        axe_os_version: f.text(Alt(&["axeOSVersion"]), "N/A"),
        idf_version: f.text(Alt(&["idfVersion"]), "N/A"),
        board_version: f.text(Alt(&["boardVersion", "deviceModel"]), "Unknown"),

        stratum_url: f.text(Alt(&["stratumURL"]), "-"),
        stratum_port: f.text(Alt(&["stratumPort"]), "-"),
        stratum_user: f.text(Alt(&["stratumUser"]), "-"),
        fallback_stratum_url: f.text(Alt(&["fallbackStratumURL"]), "-"),
        fallback_stratum_port: f.text(Alt(&["fallbackStratumPort"]), "-"),
        fallback_stratum_user: f.text(Alt(&["fallbackStratumUser"]), "-"),
        // Literal dotted key, not a path.
        is_using_fallback_stratum: f.flag(Alt(&[
            "isUsingFallbackStratum",
            "stratum.usingFallback",
        ])),

        duplicate_hw_nonces: f.count(Alt(&["duplicateHWNonces"])),
        found_blocks: f.count(Alt(&["foundBlocks"])),
        total_found_blocks: f.count(Alt(&["totalFoundBlocks"])),
        default_frequency: f.float(Alt(&["defaultFrequency"])),
        vr_frequency: f.float(Alt(&["vrFrequency"])),
        default_vr_frequency: f.float(Alt(&["defaultVrFrequency"])),
        job_interval: f.count(Alt(&["jobInterval"])),
        last_reset_reason: f.text(Alt(&["lastResetReason"]), "N/A"),
        running_partition: f.text(Alt(&["runningPartition"]), "N/A"),
        pid_p: f.float(Alt(&["pidP"])),
        pid_i: f.float(Alt(&["pidI"])),
        pid_d: f.float(Alt(&["pidD"])),

        stratum_pool_mode: f.text(Path(&["stratum", "poolMode"]), "-"),
        stratum_active_pool_mode: f.text(Path(&["stratum", "activePoolMode"]), "-"),
        stratum_pool_balance: f.float(Path(&["stratum", "poolBalance"])),
        stratum_total_best_diff: f.float(Path(&["stratum", "totalBestDiff"])),
        stratum_pool_difficulty: f.float(Path(&["stratum", "poolDifficulty"])),

        overheat_mode: f.flag(Alt(&["overheat_mode"])),
        auto_fan_speed: f.flag(Alt(&["autofanspeed"])),
        invert_fan_polarity: f.flag(Alt(&["invertfanpolarity"])),
        flip_screen: f.flag(Alt(&["flipscreen"])),
        invert_screen: f.flag(Alt(&["invertscreen"])),
    })
}

/// Typed, defaulting reads over one payload.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn get(&self, lookup: Lookup<'_>) -> Option<&'a Value> {
        lookup.resolve(self.0).filter(|value| !is_empty_value(value))
    }

    fn text(&self, lookup: Lookup<'_>, default: &str) -> String {
        match self.get(lookup) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => default.to_string(),
        }
    }

    fn float(&self, lookup: Lookup<'_>) -> f64 {
        self.get(lookup).and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn count(&self, lookup: Lookup<'_>) -> u64 {
        self.get(lookup)
            .and_then(|value| {
                value.as_u64().or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
            })
            .unwrap_or(0)
    }

    fn signed(&self, lookup: Lookup<'_>) -> i64 {
        self.get(lookup)
            .and_then(|value| {
                value
                    .as_i64()
                    .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            })
            .unwrap_or(0)
    }

    /// AxeOS reports most switches as `0`/`1` rather than booleans.
    fn flag(&self, lookup: Lookup<'_>) -> bool {
        match self.get(lookup) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }
    }

    fn list(&self, lookup: Lookup<'_>) -> Vec<Value> {
        match self.get(lookup) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::fetch::FetchErrorKind;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn path_descends_into_nested_object() {
        let data = object(json!({"stratum": {"poolMode": "solo"}}));
        assert_eq!(
            resolve_path(&data, &["stratum", "poolMode"]),
            Some(&json!("solo"))
        );
    }

    #[test]
    fn path_fails_on_missing_leaf() {
        let data = object(json!({"stratum": {"poolMode": "solo"}}));
        assert_eq!(resolve_path(&data, &["stratum", "nonexistent"]), None);
    }

    #[test]
    fn path_fails_through_non_object() {
        let data = object(json!({"stratum": "pool.example.com"}));
        assert_eq!(resolve_path(&data, &["stratum", "poolMode"]), None);
    }

    #[test]
    fn alternatives_take_first_present_key() {
        let data = object(json!({"power": 12.5}));
        assert_eq!(
            resolve_alternatives(&data, &["voltage", "power"]),
            Some(&json!(12.5))
        );

        let data = object(json!({"macAddr": "aa", "mac": "bb"}));
        assert_eq!(
            resolve_alternatives(&data, &["macAddr", "mac"]),
            Some(&json!("aa"))
        );
    }

    #[test]
    fn alternatives_do_not_descend() {
        let data = object(json!({"stratum": {"poolMode": "solo"}}));
        assert_eq!(resolve_alternatives(&data, &["poolMode"]), None);
    }

    #[test_case(Lookup::Path(&[]); "path")]
    #[test_case(Lookup::Alternatives(&[]); "alternatives")]
    fn empty_key_list_never_resolves(lookup: Lookup<'_>) {
        assert_eq!(lookup.resolve(&Map::new()), None);
        assert_eq!(lookup.resolve(&object(json!({"temp": 65}))), None);
    }

    #[test]
    fn explicit_path_ignores_same_named_top_level_key() {
        // A top-level `poolMode` must not satisfy the nested lookup.
        let data = json!({"poolMode": "pool", "stratum": {"poolMode": "solo"}});
        let status = normalize(&data, "dev").unwrap();
        assert_eq!(status.stratum_pool_mode, "solo");
    }

    #[test]
    fn empty_object_yields_all_defaults() {
        let status = normalize(&json!({}), "bitaxe-gamma").unwrap();

        assert_eq!(status.hostname, "bitaxe-gamma");
        assert_eq!(status.device_id, "N/A");
        assert_eq!(status.ip, "N/A");
        assert_eq!(status.mac, "N/A");
        assert_eq!(status.power, 0.0);
        assert_eq!(status.hash_rate, 0.0);
        assert_eq!(status.best_diff, "-");
        assert_eq!(status.best_session_diff, "-");
        assert_eq!(status.shares_accepted, 0);
        assert!(status.shares_rejected_reasons.is_empty());
        assert_eq!(status.ssid, "-");
        assert_eq!(status.asic_model, "Unknown");
        assert_eq!(status.device_model, "Unknown");
        assert_eq!(status.board_version, "Unknown");
        assert_eq!(status.version, "N/A");
        assert_eq!(status.stratum_port, "-");
        assert_eq!(status.stratum_pool_mode, "-");
        assert_eq!(status.last_reset_reason, "N/A");
        assert!(!status.is_using_fallback_stratum);
        assert!(!status.overheat_mode);
        assert!(!status.is_extended());
    }

    #[test]
    fn serialized_record_has_every_canonical_key() {
        let status = normalize(&json!({}), "dev").unwrap();
        let value = serde_json::to_value(&status).unwrap();
        let fields = value.as_object().unwrap();

        for key in [
            "hostname",
            "deviceID",
            "mac",
            "hashRate_1m",
            "temptarget",
            "overheat_temp",
            "bestDiff",
            "sharesRejectedReasons",
            "coreVoltageActual",
            "wifiRSSI",
            "ASICModel",
            "axeOSVersion",
            "stratumURL",
            "fallbackStratumPort",
            "isUsingFallbackStratum",
            "duplicateHWNonces",
            "pidP",
            "stratum_poolMode",
            "stratum_totalBestDiff",
            "autofanspeed",
            "invertscreen",
        ] {
            assert!(fields.contains_key(key), "missing {key}");
        }
        assert_eq!(fields.len(), 82);
    }

    #[test]
    fn bitaxe_payload() {
        let raw = json!({
            "power": 12.5,
            "voltage": 5100.0,
            "temp": 65,
            "vrTemp": 48,
            "hashRate": 500.0,
            "bestDiff": "1.2M",
            "ASICModel": "BM1370",
            "boardVersion": "601",
            "hostname": "bitaxe",
            "macAddr": "AA:BB:CC:DD:EE:FF",
            "sharesAccepted": 1234,
            "sharesRejected": 5,
            "stratumURL": "public-pool.io",
            "stratumPort": 21496,
            "wifiRSSI": -61,
            "fanrpm": 4200,
            "autofanspeed": 1,
            "flipscreen": 0,
        });
        let status = normalize(&raw, "fallback").unwrap();

        assert_eq!(status.hostname, "bitaxe");
        assert_eq!(status.power, 12.5);
        assert_eq!(status.voltage, 5100.0);
        assert_eq!(status.temp, 65.0);
        assert_eq!(status.hash_rate, 500.0);
        assert_eq!(status.best_diff, "1.2M");
        assert_eq!(status.asic_model, "BM1370");
        assert_eq!(status.mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(status.shares_accepted, 1234);
        assert_eq!(status.stratum_port, "21496");
        assert_eq!(status.wifi_rssi, -61);
        assert_eq!(status.fanrpm, 4200);
        assert!(status.auto_fan_speed);
        assert!(!status.flip_screen);
        // deviceModel falls back to boardVersion and vice versa
        assert_eq!(status.device_model, "601");
        assert_eq!(status.board_version, "601");
        assert!(!status.is_extended());
        assert_eq!(status.efficiency(), 40.0);
    }

    #[test]
    fn nerdaxe_payload() {
        let raw = json!({
            "hostname": "nerdqaxe",
            "ASICModel": "BM1368",
            "deviceModel": "NerdQAxe++",
            "power": 50.0,
            "temp": 70,
            "hashRate": 2000.0,
            "hashRate_1m": 1980.5,
            "hashRate_1d": 2010.0,
            "vrFrequency": 0,
            "jobInterval": 1200,
            "pidTargetTemp": 60,
            "coreVoltageActualMV": 1150,
            "foundBlocks": 1,
            "stratum": {
                "poolMode": "failover",
                "activePoolMode": "primary",
                "poolBalance": 12.5,
                "totalBestDiff": 4200000000u64,
            },
        });
        let status = normalize(&raw, "fallback").unwrap();

        assert_eq!(status.hostname, "nerdqaxe");
        assert_eq!(status.hash_rate_1m, 1980.5);
        assert_eq!(status.hash_rate_1d, 2010.0);
        assert_eq!(status.temp_target, 60.0);
        assert_eq!(status.core_voltage_actual, 1150.0);
        assert_eq!(status.found_blocks, 1);
        assert_eq!(status.stratum_pool_mode, "failover");
        assert_eq!(status.stratum_active_pool_mode, "primary");
        assert_eq!(status.stratum_pool_balance, 12.5);
        assert_eq!(status.stratum_total_best_diff, 4_200_000_000.0);
        assert_eq!(status.device_model, "NerdQAxe++");
        assert_eq!(status.board_version, "NerdQAxe++");
        assert!(status.is_extended());
    }

    #[test_case(json!({"vrFrequency": 1000}), true; "vr frequency")]
    #[test_case(json!({"jobInterval": 800}), true; "job interval")]
    #[test_case(json!({"vrFrequency": 0, "jobInterval": 0}), false; "both zero")]
    #[test_case(json!({"temp1": 68, "temp2": 72}), false; "extra sensors alone")]
    fn family_detection(raw: Value, extended: bool) {
        assert_eq!(normalize(&raw, "dev").unwrap().is_extended(), extended);
    }

    #[test]
    fn error_marker_passes_through() {
        let err = normalize(&json!({"error": "timeout"}), "dev").unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);

        let err = normalize(&json!({"error": "Connection refused"}), "dev").unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Unexpected);
        assert_eq!(err.message, "Connection refused");
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let raw = json!({
            "hostname": "",
            "ASICModel": null,
            "bestDiff": "",
            "sharesRejectedReasons": [],
            "isUsingFallbackStratum": false,
        });
        let status = normalize(&raw, "configured-name").unwrap();

        assert_eq!(status.hostname, "configured-name");
        assert_eq!(status.asic_model, "Unknown");
        assert_eq!(status.best_diff, "-");
        assert!(status.shares_rejected_reasons.is_empty());
        assert!(!status.is_using_fallback_stratum);
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let raw = json!({
            "power": "twelve",
            "sharesAccepted": -3,
            "ssid": {"name": "home"},
            "sharesRejectedReasons": "none",
            "overheat_mode": "yes",
        });
        let status = normalize(&raw, "dev").unwrap();

        assert_eq!(status.power, 0.0);
        assert_eq!(status.shares_accepted, 0);
        assert_eq!(status.ssid, "-");
        assert!(status.shares_rejected_reasons.is_empty());
        assert!(!status.overheat_mode);
    }

    #[test]
    fn numeric_best_diff_becomes_text() {
        let status = normalize(&json!({"bestDiff": 1500000}), "dev").unwrap();
        assert_eq!(status.best_diff, "1500000");
    }

    #[test]
    fn fallback_stratum_uses_literal_dotted_key() {
        let status = normalize(&json!({"stratum.usingFallback": true}), "dev").unwrap();
        assert!(status.is_using_fallback_stratum);

        let status = normalize(&json!({"stratum": {"usingFallback": true}}), "dev").unwrap();
        assert!(!status.is_using_fallback_stratum);
    }

    #[test]
    fn shares_rejected_reasons_are_kept() {
        let raw = json!({
            "sharesRejectedReasons": [{"message": "Above target", "count": 3}],
        });
        let status = normalize(&raw, "dev").unwrap();
        assert_eq!(status.shares_rejected_reasons.len(), 1);
    }

    #[test_case(json!([1, 2, 3]); "array")]
    #[test_case(json!("offline"); "string")]
    #[test_case(Value::Null; "null")]
    fn non_object_payload_normalizes_as_empty(raw: Value) {
        let status = normalize(&raw, "dev").unwrap();
        assert_eq!(status, normalize(&json!({}), "dev").unwrap());
    }
}
