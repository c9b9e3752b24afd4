//! Connection configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the push-event connection.
///
/// Holds the endpoint and the reconnect policy: retry `n` (1-based) waits
/// `reconnect_delay_ms * 2^(n-1)`, and at most `max_reconnect_attempts`
/// retries are scheduled before giving up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Push-event endpoint URL.
    #[serde(default)]
    pub url: String,

    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Whether a failed or closed connection schedules retries on its own.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum number of scheduled retries.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Returns the handshake timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = 1u64 << exponent;
        Duration::from_millis(self.reconnect_delay_ms.saturating_mul(factor))
    }

    /// Whether another retry may be scheduled after `attempts` retries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.auto_reconnect && attempts < self.max_reconnect_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();

        assert!(config.url.is_empty());
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay_ms, 1_000);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_exponential_backoff() {
        let config = ConnectionConfig::new("ws://localhost/feed")
            .with_reconnect_delay(Duration::from_secs(1));

        assert_eq!(config.reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(4));
        assert_eq!(config.reconnect_delay(4), Duration::from_secs(8));
        assert_eq!(config.reconnect_delay(5), Duration::from_secs(16));
    }

    #[test]
    fn test_should_retry() {
        let config = ConnectionConfig::default();

        assert!(config.should_retry(0));
        assert!(config.should_retry(4));
        assert!(!config.should_retry(5));

        let manual_only = ConnectionConfig::default().with_auto_reconnect(false);
        assert!(!manual_only.should_retry(0));
    }

    #[test]
    fn test_config_partial_json() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"url":"wss://shop.example/ws","reconnect_delay_ms":250}"#)
                .unwrap();

        assert_eq!(config.url, "wss://shop.example/ws");
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    proptest! {
        #[test]
        fn prop_backoff_doubles(base in 1u64..10_000, attempt in 1u32..6) {
            let config = ConnectionConfig::default()
                .with_reconnect_delay(Duration::from_millis(base));
            let expected = base * 2u64.pow(attempt - 1);
            prop_assert_eq!(config.reconnect_delay(attempt), Duration::from_millis(expected));
        }
    }
}
