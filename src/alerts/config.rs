use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alert store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStoreConfig {
    /// Seconds after which a low-rank alert removes itself.
    #[serde(default = "default_low_expiry_secs")]
    pub low_expiry_secs: u64,
}

fn default_low_expiry_secs() -> u64 {
    600
}

impl Default for AlertStoreConfig {
    fn default() -> Self {
        Self {
            low_expiry_secs: default_low_expiry_secs(),
        }
    }
}

impl AlertStoreConfig {
    pub fn with_low_expiry(mut self, expiry: Duration) -> Self {
        self.low_expiry_secs = expiry.as_secs();
        self
    }

    pub fn low_expiry(&self) -> Duration {
        Duration::from_secs(self.low_expiry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ten_minutes() {
        assert_eq!(AlertStoreConfig::default().low_expiry(), Duration::from_secs(600));

        let parsed: AlertStoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, AlertStoreConfig::default());
    }
}
