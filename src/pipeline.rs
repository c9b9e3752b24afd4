//! Pipeline: wires the connection, router, alert store and channels together.

use std::sync::{Arc, Weak};
use tracing::{error, info};

use crate::alerts::AlertStore;
use crate::channels::{
    HeadlessPlatform, NotificationChannels, PlatformBackends, SettingsStore, ToastLevel,
};
use crate::config::PipelineConfig;
use crate::connection::{ConnectionManager, StatusChange, Transport, STATUS_TOPIC};
use crate::error::Result;
use crate::router::{DashboardMetrics, EventRouter};
use crate::subscriptions::{Subscription, SubscriptionConfig, SubscriptionHandle, TopicRegistry};
use crate::types::{ConnectionState, EventEnvelope};

/// Toast shown once when automatic reconnection gives up.
pub const CONNECTION_LOST_MESSAGE: &str =
    "Lost connection to live updates. Reconnect to resume.";

/// Point-in-time figures for the whole pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineStats {
    pub status: ConnectionState,
    pub reconnect_attempts: u32,
    pub alert_count: usize,
    pub unacknowledged_count: usize,
    pub events_routed: u64,
    pub subscribers: usize,
}

/// One instance per process.
///
/// Data flows one way: transport, then [`ConnectionManager`], then
/// [`EventRouter`], which feeds the [`AlertStore`] (and through it the
/// [`NotificationChannels`]) and the topic subscribers.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<TopicRegistry<EventEnvelope>>,
    channels: Arc<NotificationChannels>,
    alerts: Arc<AlertStore>,
    router: Arc<EventRouter>,
    connection: Arc<ConnectionManager>,
    _status_watch: Subscription,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        backends: PlatformBackends,
    ) -> Result<Self> {
        config.validate()?;

        let channels = Arc::new(match &config.settings_path {
            Some(path) => NotificationChannels::with_store(backends, SettingsStore::new(path)),
            None => NotificationChannels::new(backends),
        });

        let registry = TopicRegistry::new();
        let alerts = AlertStore::with_channels(config.alerts.clone(), Arc::clone(&channels));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&registry),
            Arc::clone(&alerts),
            Arc::clone(&channels),
        ));
        let connection = ConnectionManager::new(
            config.connection.clone(),
            transport,
            Arc::clone(&registry),
            router.clone(),
        );

        let status_watch = Self::watch_status(&registry, Arc::downgrade(&channels));

        info!(url = %config.connection.url, "Pipeline ready");

        Ok(Self {
            config,
            registry,
            channels,
            alerts,
            router,
            connection,
            _status_watch: status_watch,
        })
    }

    /// A pipeline on the recording platform.
    pub fn headless(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, Arc<HeadlessPlatform>)> {
        let platform = HeadlessPlatform::new();
        let pipeline = Self::new(config, transport, HeadlessPlatform::backends(&platform))?;
        Ok((pipeline, platform))
    }

    /// Surface exhausted retries to the user, once per exhaustion.
    fn watch_status(
        registry: &Arc<TopicRegistry<EventEnvelope>>,
        channels: Weak<NotificationChannels>,
    ) -> Subscription {
        registry.subscribe(STATUS_TOPIC, move |envelope: &EventEnvelope| {
            let Some(change) = StatusChange::from_envelope(envelope) else {
                return;
            };
            if !change.exhausted {
                return;
            }
            error!(attempts = change.attempt, "Live updates unavailable");
            if let Some(channels) = channels.upgrade() {
                channels.notice(CONNECTION_LOST_MESSAGE, ToastLevel::Error);
            }
        })
    }

    /// Connect to the feed. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        self.connection.connect();
    }

    pub fn stop(&self) {
        self.connection.disconnect();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn alerts(&self) -> &Arc<AlertStore> {
        &self.alerts
    }

    pub fn channels(&self) -> &Arc<NotificationChannels> {
        &self.channels
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn status(&self) -> ConnectionState {
        self.connection.status()
    }

    pub fn latest_metrics(&self) -> Option<DashboardMetrics> {
        self.router.latest_metrics()
    }

    /// Register a callback for `topic` (an event type, `all` or `status_change`).
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, callback)
    }

    pub fn subscribe_channel(
        &self,
        topic: &str,
        config: SubscriptionConfig,
    ) -> SubscriptionHandle<EventEnvelope> {
        self.registry.subscribe_channel(topic, config)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            status: self.connection.status(),
            reconnect_attempts: self.connection.reconnect_attempts(),
            alert_count: self.alerts.alert_count(),
            unacknowledged_count: self.alerts.unacknowledged_count(),
            events_routed: self.router.routed_count(),
            subscribers: self.registry.total_subscribers(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}
