//! Configuration types for the RTM adapter.
//!
//! The schema is loaded from the global `courier.toml` configuration file
//! (or built programmatically):
//!
//! ```toml
//! [adapter]
//! auto_reconnect = true
//! reconnect_delay_ms = 5000
//! cache_ttl_secs = 300
//! fetch_timeout_ms = 10000
//! page_limit = 200
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// RTM adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtmConfig {
    /// Whether to reconnect after the platform closes the stream.
    pub auto_reconnect: bool,

    /// Delay before a reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Time-to-live of user and conversation cache entries, in seconds.
    pub cache_ttl_secs: u64,

    /// Timeout for a single enrichment fetch, in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Page size requested from the user directory listing.
    pub page_limit: usize,
}

impl Default for RtmConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 5000,
            cache_ttl_secs: 300,
            fetch_timeout_ms: 10000,
            page_limit: 200,
        }
    }
}

impl RtmConfig {
    /// The reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// The cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The enrichment fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: RtmConfig = serde_json::from_str(r#"{"auto_reconnect": false}"#).unwrap();
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(10000));
        assert_eq!(config.page_limit, 200);
    }
}
