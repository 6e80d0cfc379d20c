//! Configuration for the session host.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::path::ActorPath;

/// Session host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// System name; also the local location name of hosted sessions.
    pub system_name: String,

    /// Path the session manager binds to.
    pub service_path: ActorPath,

    /// RPC reply timeout in milliseconds.
    pub call_timeout_ms: u64,

    /// Expiry for pending dynamic pairings. Unset means they never expire.
    pub pairing_timeout_secs: Option<u64>,

    /// Bootstrap a loopback client session on start.
    pub demo_client: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl HostConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let system_name = lookup("PAIRWISE_SYSTEM_NAME").unwrap_or_else(|| "server".to_string());

        let service_path = lookup("PAIRWISE_SERVICE_PATH")
            .unwrap_or_else(|| "pairwise.appservice".to_string());
        let service_path = ActorPath::parse(&service_path)
            .with_context(|| format!("invalid PAIRWISE_SERVICE_PATH {service_path:?}"))?;

        let call_timeout_ms = lookup("PAIRWISE_CALL_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);

        let pairing_timeout_secs = lookup("PAIRWISE_PAIRING_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0);

        let demo_client = lookup("PAIRWISE_DEMO_CLIENT")
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let log_level = lookup("PAIRWISE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            system_name,
            service_path,
            call_timeout_ms,
            pairing_timeout_secs,
            demo_client,
            log_level,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn pairing_timeout(&self) -> Option<Duration> {
        self.pairing_timeout_secs.map(Duration::from_secs)
    }
}
