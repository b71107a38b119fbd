//! Short-lived cache of normalized device statuses.
//!
//! Callers ask for the whole fleet at once. Entries younger than the TTL
//! are served from memory; everything else is refreshed together:
//!
//! ```text
//!   get_all(names)
//!        |
//!        +-- fresh ------------------------------> result
//!        |
//!        +-- stale --> JoinSet: one task per device
//!                         fetch -> normalize -> store
//!                                                  --> result
//! ```
//!
//! A failing device is just an `Err` entry in the result; it never holds
//! up or fails the other devices.
//!
//! Two overlapping `get_all` calls may both refresh the same stale device.
//! Deduplication only happens within one call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::fetch::{Fetch, FetchError};
use crate::normalize::{CanonicalStatus, normalize};
use crate::tracing::prelude::*;

/// Outcome of the latest poll of one device.
pub type DeviceStatus = Result<CanonicalStatus, FetchError>;

/// How long a polled status is served without asking the device again.
pub const CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CacheEntry {
    status: DeviceStatus,
    fetched_at: Instant,
}

pub struct StatusCache {
    fetcher: Arc<dyn Fetch>,
    /// Device name to address, as configured.
    devices: BTreeMap<String, String>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl StatusCache {
    pub fn new<I, N, A>(fetcher: Arc<dyn Fetch>, devices: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            fetcher,
            devices: devices
                .into_iter()
                .map(|(name, ip)| (name.into(), ip.into()))
                .collect(),
            ttl: CACHE_TTL,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Configured device names, in order.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Status of every configured device.
    pub async fn get_all_devices(&self) -> BTreeMap<String, DeviceStatus> {
        let names: Vec<&str> = self.device_names().collect();
        self.get_all(&names).await
    }

    /// Status of each named device, refreshing stale ones concurrently.
    ///
    /// Names that are not configured, or configured without an address,
    /// are left out of the result.
    pub async fn get_all<S: AsRef<str>>(&self, names: &[S]) -> BTreeMap<String, DeviceStatus> {
        let mut result = BTreeMap::new();
        let mut stale: Vec<(String, String)> = Vec::new();

        {
            let entries = self.entries.read();
            let now = Instant::now();
            for name in names {
                let name = name.as_ref();
                if result.contains_key(name) || stale.iter().any(|(n, _)| n == name) {
                    continue;
                }
                let Some(ip) = self.devices.get(name).filter(|ip| !ip.is_empty()) else {
                    trace!(device = name, "Skipping device without address");
                    continue;
                };
                match entries.get(name) {
                    Some(entry) if now.duration_since(entry.fetched_at) < self.ttl => {
                        result.insert(name.to_string(), entry.status.clone());
                    }
                    _ => stale.push((name.to_string(), ip.clone())),
                }
            }
        }

        if stale.is_empty() {
            return result;
        }

        debug!(
            fresh = result.len(),
            stale = stale.len(),
            "Refreshing device statuses"
        );

        let mut tasks = JoinSet::new();
        for (name, ip) in stale.iter().cloned() {
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move {
                let status = match fetcher.fetch(&ip).await {
                    Ok(raw) => normalize(&raw, &name),
                    Err(e) => Err(e),
                };
                (name, status)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, status)) => {
                    self.store(&name, status.clone());
                    result.insert(name, status);
                }
                Err(e) => {
                    error!(error = %e, "Device refresh task failed");
                }
            }
        }

        // A task that panicked leaves its device without a result.
        for (name, _) in stale {
            if !result.contains_key(&name) {
                let status: DeviceStatus = Err(FetchError::unexpected("refresh task failed"));
                self.store(&name, status.clone());
                result.insert(name, status);
            }
        }

        result
    }

    fn store(&self, name: &str, status: DeviceStatus) {
        let mut entries = self.entries.write();
        // Stamped under the lock so fetched_at never goes backwards.
        let fetched_at = Instant::now();
        entries.insert(name.to_string(), CacheEntry { status, fetched_at });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::time;

    use super::*;
    use crate::fetch::FetchErrorKind;

    /// Serves canned payloads by ip and counts calls per ip.
    #[derive(Default)]
    struct FakeFetcher {
        payloads: HashMap<String, Result<Value, FetchError>>,
        delay: Duration,
        calls: parking_lot::Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        panics_on: Option<String>,
    }

    impl FakeFetcher {
        fn with(mut self, ip: &str, payload: Result<Value, FetchError>) -> Self {
            self.payloads.insert(ip.to_string(), payload);
            self
        }

        fn panicking(mut self, ip: &str) -> Self {
            self.panics_on = Some(ip.to_string());
            self
        }

        fn calls(&self, ip: &str) -> usize {
            self.calls.lock().get(ip).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().values().sum()
        }
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(&self, ip: &str) -> Result<Value, FetchError> {
            *self.calls.lock().entry(ip.to_string()).or_default() += 1;
            if self.panics_on.as_deref() == Some(ip) {
                panic!("fetcher bug for {ip}");
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.payloads
                .get(ip)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::client("no route to host")))
        }
    }

    fn fleet(fetcher: &Arc<FakeFetcher>) -> StatusCache {
        StatusCache::new(
            Arc::clone(fetcher) as Arc<dyn Fetch>,
            [
                ("alpha", "10.0.0.1"),
                ("beta", "10.0.0.2"),
                ("gamma", "10.0.0.3"),
            ],
        )
    }

    fn online(hostname: &str) -> Result<Value, FetchError> {
        Ok(json!({"hostname": hostname, "hashRate": 500.0, "bestDiff": "1.5M"}))
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served_without_fetching() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.1", online("alpha")));
        let cache = fleet(&fetcher);

        let first = cache.get_all(&["alpha"]).await;
        assert_eq!(fetcher.calls("10.0.0.1"), 1);

        time::advance(Duration::from_secs(4)).await;
        let second = cache.get_all(&["alpha"]).await;
        assert_eq!(fetcher.calls("10.0.0.1"), 1);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.1", online("alpha")));
        let cache = fleet(&fetcher);

        cache.get_all(&["alpha"]).await;
        time::advance(CACHE_TTL).await;
        cache.get_all(&["alpha"]).await;

        assert_eq!(fetcher.calls("10.0.0.1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_devices_are_fetched_concurrently() {
        let fetcher = FakeFetcher {
            delay: Duration::from_secs(1),
            ..FakeFetcher::default()
        };
        let fetcher = Arc::new(
            fetcher
                .with("10.0.0.1", online("alpha"))
                .with("10.0.0.2", online("beta"))
                .with("10.0.0.3", online("gamma")),
        );
        let cache = fleet(&fetcher);

        let start = Instant::now();
        let statuses = cache.get_all_devices().await;

        assert_eq!(statuses.len(), 3);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 3);
        // Serial fetching would take three seconds of virtual time.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_affect_others() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with("10.0.0.1", online("alpha"))
                .with("10.0.0.2", Err(FetchError::timeout()))
                .with("10.0.0.3", online("gamma")),
        );
        let cache = fleet(&fetcher);

        let statuses = cache.get_all_devices().await;

        assert_eq!(statuses["alpha"].as_ref().unwrap().hostname, "alpha");
        assert_eq!(
            statuses["beta"].as_ref().unwrap_err().kind,
            FetchErrorKind::Timeout
        );
        assert_eq!(statuses["gamma"].as_ref().unwrap().hostname, "gamma");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_cached_too() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.2", Err(FetchError::timeout())));
        let cache = fleet(&fetcher);

        cache.get_all(&["beta"]).await;
        cache.get_all(&["beta"]).await;

        assert_eq!(fetcher.calls("10.0.0.2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_fresh_and_stale() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with("10.0.0.1", online("alpha"))
                .with("10.0.0.2", online("beta")),
        );
        let cache = fleet(&fetcher);

        cache.get_all(&["alpha"]).await;
        time::advance(Duration::from_secs(2)).await;
        let statuses = cache.get_all(&["alpha", "beta"]).await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(fetcher.calls("10.0.0.1"), 1);
        assert_eq!(fetcher.calls("10.0.0.2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_unaddressed_devices_are_skipped() {
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = StatusCache::new(
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
            [("alpha", ""), ("beta", "10.0.0.2")],
        );

        let statuses = cache.get_all(&["alpha", "delta"]).await;

        assert!(statuses.is_empty());
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_names_fetch_once() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.1", online("alpha")));
        let cache = fleet(&fetcher);

        let statuses = cache.get_all(&["alpha", "alpha"]).await;

        assert_eq!(statuses.len(), 1);
        assert_eq!(fetcher.calls("10.0.0.1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_hostname_falls_back_to_device_name() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.3", Ok(json!({"temp": 60}))));
        let cache = fleet(&fetcher);

        let statuses = cache.get_all(&["gamma"]).await;

        assert_eq!(statuses["gamma"].as_ref().unwrap().hostname, "gamma");
    }

    #[tokio::test(start_paused = true)]
    async fn custom_ttl() {
        let fetcher = Arc::new(FakeFetcher::default().with("10.0.0.1", online("alpha")));
        let cache = fleet(&fetcher).with_ttl(Duration::from_secs(30));

        cache.get_all(&["alpha"]).await;
        time::advance(Duration::from_secs(29)).await;
        cache.get_all(&["alpha"]).await;
        assert_eq!(fetcher.calls("10.0.0.1"), 1);

        time::advance(Duration::from_secs(1)).await;
        cache.get_all(&["alpha"]).await;
        assert_eq!(fetcher.calls("10.0.0.1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_refresh_becomes_cached_unexpected_error() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with("10.0.0.1", online("alpha"))
                .panicking("10.0.0.2"),
        );
        let cache = fleet(&fetcher);

        let statuses = cache.get_all(&["alpha", "beta"]).await;

        assert_eq!(statuses["alpha"].as_ref().unwrap().hostname, "alpha");
        let err = statuses["beta"].as_ref().unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Unexpected);
        assert_eq!(err.message, "refresh task failed");

        time::advance(Duration::from_secs(1)).await;
        let again = cache.get_all(&["beta"]).await;
        assert_eq!(fetcher.calls("10.0.0.2"), 1);
        assert_eq!(again["beta"], statuses["beta"]);
    }
}
