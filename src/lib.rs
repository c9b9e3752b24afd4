//! # Alert Pipeline
//!
//! Real-time event distribution and multi-channel alerting for a storefront
//! admin console.
//!
//! ## Core Concepts
//!
//! - **Connection**: one reconnecting push-event link with exponential backoff
//! - **Router**: built-in handling per event type, plus topic and wildcard fan-out
//! - **Alerts**: ranked alerts with acknowledgement and low-rank expiry
//! - **Channels**: visual, spoken, tonal and banner notifications
//!
//! ## Example
//!
//! ```ignore
//! use alert_pipeline::{Pipeline, PipelineConfig, WebSocketTransport};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new("wss://shop.example/ws");
//! let (pipeline, _platform) = Pipeline::headless(config, Arc::new(WebSocketTransport::new()))?;
//!
//! let _sub = pipeline.alerts().subscribe(|alerts| {
//!     println!("{} alerts", alerts.len());
//! });
//!
//! pipeline.start();
//! ```

pub mod alerts;
pub mod channels;
pub mod config;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod router;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use alerts::{AlertStore, AlertStoreConfig, ALERTS_TOPIC};
pub use channels::{
    ChannelConfig, ChannelKind, ChannelSettings, HeadlessPlatform, NotificationChannels,
    PlatformBackends, SettingsStore,
};
pub use config::PipelineConfig;
pub use connection::{
    ConnectionConfig, ConnectionManager, MockOutcome, MockTransport, StatusChange, Transport,
    WebSocketTransport, STATUS_TOPIC,
};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineStats};
pub use router::{DashboardMetrics, EventRouter, WILDCARD_TOPIC};
pub use subscriptions::{Subscription, SubscriptionConfig, SubscriptionHandle, TopicRegistry};
pub use types::{Alert, AlertId, ConnectionState, EventEnvelope, Rank, RawAlert, Timestamp};
