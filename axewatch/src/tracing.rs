//! Logging setup and the crate-local tracing prelude.

use tracing_subscriber::{EnvFilter, fmt::time::UtcTime, prelude::*};

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

/// Filter used when `RUST_LOG` is unset or unparsable.
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to the journal with
/// their structured fields intact. Everywhere else they are written to
/// stdout with UTC timestamps. Both honour `RUST_LOG`.
pub fn init_journald_or_stdout() {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter())
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("journald unavailable ({e}), logging to stdout");
            }
        }
    }

    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_timer(UtcTime::rfc_3339()))
        .init();
}
