//! Shared test helpers.
//!
//! - [`Events`]: named, countable signals that tests await with a timeout
//!   instead of polling.
//! - [`init_tracing`]: installs a test-friendly subscriber once per process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Default wait used by [`Events::wait`].
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// A set of named events shared between test actors and the test body.
///
/// Every event counts how many times it was set; waiting completes as soon
/// as the count reaches the requested value.
#[derive(Debug, Clone, Default)]
pub struct Events {
    inner: Arc<Mutex<HashMap<String, watch::Sender<u32>>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<u32>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channel(&self, name: &str) -> watch::Sender<u32> {
        self.lock()
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }

    /// Sets (fires) the event once more.
    pub fn set(&self, name: &str) {
        self.channel(name).send_modify(|count| *count += 1);
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// How many times the event has been set.
    pub fn count(&self, name: &str) -> u32 {
        self.lock().get(name).map(|tx| *tx.borrow()).unwrap_or(0)
    }

    /// Waits until the event has been set `times` times. Returns false on
    /// timeout.
    pub async fn wait_for_count(&self, name: &str, times: u32, timeout: Duration) -> bool {
        let mut rx = self.channel(name).subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|count| *count >= times))
            .await
            .is_ok_and(|res| res.is_ok())
    }

    /// Waits until the event is set. Returns false on timeout.
    pub async fn wait_for(&self, name: &str, timeout: Duration) -> bool {
        self.wait_for_count(name, 1, timeout).await
    }

    /// [`Events::wait_for`] with [`DEFAULT_WAIT`].
    pub async fn wait(&self, name: &str) -> bool {
        self.wait_for(name, DEFAULT_WAIT).await
    }

    /// Waits for every named event. Returns the names that timed out.
    pub async fn wait_all(&self, names: &[&str], timeout: Duration) -> Vec<String> {
        let mut missing = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        for name in names {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if !self.wait_for(name, left).await {
                missing.push((*name).to_string());
            }
        }
        missing
    }
}

/// Installs a fmt subscriber writing through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
