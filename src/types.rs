//! Core types for the alert pipeline.

use crate::error::{PipelineError, Result};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for an alert.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertId(pub u64);

impl fmt::Debug for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlertId({})", self.0)
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// State of the push-event connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper for every inbound event: `{type, data, timestamp}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default)]
    pub timestamp: String,
}

impl EventEnvelope {
    /// Build a locally originated envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Parse a raw text frame.
    pub fn parse(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| PipelineError::MalformedPayload(e.to_string()))
    }
}

/// Three-level alert rank.
///
/// The feed speaks a four-level severity scheme; `critical` and `high` both
/// collapse to [`Rank::High`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Low,
    Medium,
    High,
}

impl Rank {
    /// Map a raw severity string to a rank. Missing or unknown severities rank medium.
    pub fn from_severity(severity: Option<&str>) -> Self {
        match severity.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") | Some("high") => Rank::High,
            Some("low") => Rank::Low,
            _ => Rank::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Low => "low",
            Rank::Medium => "medium",
            Rank::High => "high",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string field that some producers send as a number.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn lenient_optional_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Stock counts may arrive as `2` or `2.0`. Fractional counts are rejected.
fn lenient_stock<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(count) = n.as_i64() {
                return Ok(Some(count));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                _ => Err(de::Error::custom(format!("expected a whole stock count, got {n}"))),
            }
        }
        other => Err(de::Error::custom(format!(
            "expected a stock count, got {other}"
        ))),
    }
}

/// Raw alert data as it arrives in an `inventory_alert` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_stock",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_stock: Option<i64>,
}

impl RawAlert {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_stock(mut self, current_stock: i64) -> Self {
        self.current_stock = Some(current_stock);
        self
    }
}

/// A normalized, ranked alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub message: String,
    pub rank: Rank,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stock: Option<i64>,

    pub created_at: Timestamp,
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_collapse() {
        assert_eq!(Rank::from_severity(Some("critical")), Rank::High);
        assert_eq!(Rank::from_severity(Some("high")), Rank::High);
        assert_eq!(Rank::from_severity(Some("HIGH")), Rank::High);
        assert_eq!(Rank::from_severity(Some("medium")), Rank::Medium);
        assert_eq!(Rank::from_severity(Some("low")), Rank::Low);
        assert_eq!(Rank::from_severity(None), Rank::Medium);
        assert_eq!(Rank::from_severity(Some("whatever")), Rank::Medium);
    }

    #[test]
    fn test_rank_ordering() {
        assert!(Rank::High > Rank::Medium);
        assert!(Rank::Medium > Rank::Low);
    }

    #[test]
    fn test_envelope_without_timestamp() {
        let envelope =
            EventEnvelope::parse(r#"{"type":"inventory_alert","data":{"message":"x"}}"#).unwrap();
        assert_eq!(envelope.event_type, "inventory_alert");
        assert_eq!(envelope.data["message"], "x");
        assert!(envelope.timestamp.is_empty());
    }

    #[test]
    fn test_envelope_rejects_garbage() {
        assert!(matches!(
            EventEnvelope::parse("{not json"),
            Err(PipelineError::MalformedPayload(_))
        ));
        // A frame without a type is not an envelope.
        assert!(EventEnvelope::parse(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_raw_alert_camel_case() {
        let raw: RawAlert = serde_json::from_value(json!({
            "message": "Blue Hoodie low",
            "severity": "high",
            "productId": "p1",
            "currentStock": 2
        }))
        .unwrap();

        assert_eq!(raw.product_id.as_deref(), Some("p1"));
        assert_eq!(raw.current_stock, Some(2));
        assert!(raw.product_name.is_none());
    }

    #[test]
    fn test_raw_alert_numeric_product_and_float_stock() {
        let raw: RawAlert = serde_json::from_value(json!({
            "message": "Blue Hoodie low",
            "productId": 42,
            "currentStock": 2.0
        }))
        .unwrap();

        assert_eq!(raw.product_id.as_deref(), Some("42"));
        assert_eq!(raw.current_stock, Some(2));

        let nulls: RawAlert = serde_json::from_value(json!({
            "message": "x",
            "productId": null,
            "currentStock": null
        }))
        .unwrap();
        assert!(nulls.product_id.is_none());
        assert!(nulls.current_stock.is_none());
    }

    #[test]
    fn test_raw_alert_rejects_fractional_stock() {
        let result: serde_json::Result<RawAlert> = serde_json::from_value(json!({
            "message": "x",
            "currentStock": 2.5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_state_wire_names() {
        assert_eq!(
            serde_json::to_value(ConnectionState::Connected).unwrap(),
            json!("connected")
        );
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }
}
