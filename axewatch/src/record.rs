//! All-time best difficulty across the fleet.
//!
//! One record survives restarts in a small JSON file:
//!
//! ```json
//! {
//!   "value": 2100000,
//!   "short": "M",
//!   "hostname": "bitaxe-gamma",
//!   "timestamp": "2025-06-01T12:00:00Z"
//! }
//! ```
//!
//! The file is read once; afterwards the in-memory copy is authoritative
//! and the file only follows it. Every update goes through one async
//! mutex, so two devices reporting a new best at the same moment cannot
//! both beat the same old value.

use std::fmt;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::normalize::CanonicalStatus;
use crate::tracing::prelude::*;
use crate::types::{BestDiff, Suffix, group_thousands};

/// File name used inside the data directory.
pub const RECORD_FILE_NAME: &str = "best_difficulty.json";

/// The persisted best share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestRecord {
    pub value: u64,
    pub short: Suffix,
    pub hostname: String,
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
}

impl BestRecord {
    /// `2,100,000 (M)`
    pub fn formatted(&self) -> String {
        format!("{} ({})", group_thousands(self.value), self.short)
    }
}

impl fmt::Display for BestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.formatted(), self.hostname)
    }
}

/// Result of offering a difficulty to the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordUpdate {
    pub is_new_record: bool,
    /// Display form of the new value when it is a record.
    pub formatted: Option<String>,
}

impl RecordUpdate {
    fn unchanged() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct RecordState {
    loaded: bool,
    record: Option<BestRecord>,
}

/// Owner of the best record and its file.
#[derive(Debug)]
pub struct BestRecordStore {
    path: PathBuf,
    state: Mutex<RecordState>,
}

impl BestRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(RecordState::default()),
        }
    }

    /// Store backed by [`RECORD_FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(RECORD_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record, reading the file on first use.
    pub async fn load(&self) -> Option<BestRecord> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.record.clone()
    }

    /// Offer a device's reported best difficulty.
    pub async fn check_status(&self, status: &CanonicalStatus) -> RecordUpdate {
        self.check_and_update(&status.best_diff, &status.hostname)
            .await
    }

    /// Replace the record if `diff` is strictly larger than it.
    ///
    /// Unparsable input is ignored. A failed write is logged and the new
    /// value stays in memory; the next record written includes it. While
    /// the file exists but cannot be read, new values are held in memory
    /// only and the read is retried on every call.
    pub async fn check_and_update(&self, diff: &str, hostname: &str) -> RecordUpdate {
        let parsed: BestDiff = match diff.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(hostname, diff, error = %e, "Ignoring unparsable difficulty");
                return RecordUpdate::unchanged();
            }
        };

        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;

        let current = state.record.as_ref().map_or(0, |record| record.value);
        if parsed.magnitude() <= current {
            trace!(hostname, value = parsed.magnitude(), current, "Not a record");
            return RecordUpdate::unchanged();
        }

        let record = BestRecord {
            value: parsed.magnitude(),
            short: parsed.suffix().unwrap_or(Suffix::G),
            hostname: hostname.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };
        info!(
            hostname,
            value = record.value,
            previous = current,
            "New best difficulty"
        );

        if !state.loaded {
            warn!(path = %self.path.display(), "Best record file unreadable; not overwriting it");
        } else if let Err(e) = self.persist(&record).await {
            error!(path = %self.path.display(), error = %e, "Failed to persist best record");
        }
        state.record = Some(record);

        RecordUpdate {
            is_new_record: true,
            formatted: Some(parsed.to_string()),
        }
    }

    async fn ensure_loaded(&self, state: &mut RecordState) {
        if state.loaded {
            return;
        }

        match read_record(&self.path).await {
            Ok(Some(record)) => {
                debug!(path = %self.path.display(), value = record.value, "Loaded best record");
                state.loaded = true;
                // A value taken while the file was unreadable may beat it.
                if state.record.as_ref().is_none_or(|held| held.value <= record.value) {
                    state.record = Some(record);
                }
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No best record yet");
                state.loaded = true;
            }
            Err(e @ Error::Io { .. }) => {
                warn!(error = %e, "Failed to read best record; retrying on next use");
            }
            Err(e) => {
                error!(error = %e, "Failed to read best record; starting without one");
                state.loaded = true;
            }
        }
    }

    async fn persist(&self, record: &BestRecord) -> Result<()> {
        let path = self.path.clone();
        let contents = serde_json::to_vec_pretty(record).map_err(|e| Error::json(&path, e))?;
        tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
            .await
            .map_err(|e| Error::Other(e.to_string()))?
    }
}

async fn read_record(path: &Path) -> Result<Option<BestRecord>> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };

    if contents.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_slice(&contents).map_err(|e| Error::json(path, e))?;
    if value.as_object().is_some_and(|fields| fields.is_empty()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| Error::json(path, e))
}

/// Write to a sibling temp file, then rename it over `path`.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written {
        // The temp file may never have been created.
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::io(&tmp, e));
    }

    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

/// RFC 3339 on write. Older files carry a naive ISO-8601 timestamp, which
/// is read as UTC.
mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use time::format_description::well_known::{Iso8601, Rfc3339};
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = value
            .format(&Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        if let Ok(value) = OffsetDateTime::parse(&text, &Rfc3339) {
            return Ok(value);
        }
        PrimitiveDateTime::parse(&text, &Iso8601::DEFAULT)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(D::Error::custom)
    }
}
