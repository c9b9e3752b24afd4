//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::alerts::AlertStoreConfig;
use crate::connection::ConnectionConfig;
use crate::error::{PipelineError, Result};

/// Top-level configuration, loadable from JSON.
///
/// ```json
/// {
///   "connection": { "url": "wss://shop.example/ws", "reconnect_delay_ms": 1000 },
///   "alerts": { "low_expiry_secs": 600 },
///   "settings_path": "/var/lib/alert-monitor/channels.bin"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub alerts: AlertStoreConfig,

    /// Where channel settings are persisted. Unset means in-memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(url),
            alerts: AlertStoreConfig::default(),
            settings_path: None,
        }
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: AlertStoreConfig) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn with_settings_path(mut self, path: impl AsRef<Path>) -> Self {
        self.settings_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.connection.url.trim();
        if url.is_empty() {
            return Err(PipelineError::Config("connection.url is required".to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(PipelineError::Config(format!(
                "connection.url must be a ws:// or wss:// URL, got {url}"
            )));
        }
        if self.connection.reconnect_delay_ms == 0 {
            return Err(PipelineError::Config(
                "connection.reconnect_delay_ms must be positive".to_string(),
            ));
        }
        if self.alerts.low_expiry_secs == 0 {
            return Err(PipelineError::Config(
                "alerts.low_expiry_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
