//! Raw status retrieval from AxeOS devices.
//!
//! One GET per device per refresh, bounded by a short timeout and never
//! retried here. Retrying is simply the next polling cycle. Every failure
//! comes back as a [`FetchError`] value so a dead miner shows up as an
//! entry in the status map instead of aborting the cycle.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strum::Display;
use thiserror::Error;

use crate::error;
use crate::tracing::prelude::*;

/// Status endpoint served by AxeOS (Bitaxe) and its NerdAxe fork.
pub const STATUS_PATH: &str = "/api/system/info";

/// Upper bound on one request, connect through body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FetchErrorKind {
    Timeout,
    ClientError,
    Unexpected,
}

/// Why a device produced no status this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn timeout() -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: "timeout".to_string(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::ClientError,
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unexpected,
            message: message.into(),
        }
    }

    /// Rebuild an error from the `"error"` marker of a payload.
    pub(crate) fn from_marker(marker: &str) -> Self {
        if marker == "timeout" {
            Self::timeout()
        } else {
            Self::unexpected(marker)
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout()
        } else if err.is_connect()
            || err.is_request()
            || err.is_body()
            || err.is_decode()
            || err.is_redirect()
            || err.is_status()
        {
            Self::client(err.to_string())
        } else {
            Self::unexpected(err.to_string())
        }
    }
}

/// Source of raw device payloads.
///
/// The cache only sees this trait, so tests can substitute canned or
/// counting fetchers for the HTTP implementation.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Retrieve the raw status object of the device at `ip`.
    ///
    /// `ip` may carry a port (`"10.0.0.5:8080"`).
    async fn fetch(&self, ip: &str) -> Result<Value, FetchError>;
}

/// [`Fetch`] over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> error::Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Fails only when the HTTP client itself cannot be built, e.g. the
    /// TLS backend does not initialize.
    pub fn with_timeout(timeout: Duration) -> error::Result<Self> {
        // Miners sit on the local network, never behind a proxy.
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, ip: &str) -> Result<Value, FetchError> {
        let url = format!("http://{ip}{STATUS_PATH}");

        // Status codes are not checked; a non-JSON error page fails decoding.
        let result = async {
            self.client
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await?
                .json::<Value>()
                .await
        }
        .await;

        match result {
            Ok(payload) => {
                debug!(ip, "Fetched device status");
                Ok(payload)
            }
            Err(e) => {
                let err = FetchError::from_reqwest(&e);
                error!(ip, kind = %err.kind, error = %e, "Failed to fetch device status");
                Err(err)
            }
        }
    }
}
