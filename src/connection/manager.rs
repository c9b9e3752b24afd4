//! Connection manager: one logical push-event connection with automatic
//! reconnection.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ConnectionConfig;
use super::transport::{Transport, TransportFrame, TransportLink};
use crate::error::{PipelineError, Result};
use crate::subscriptions::{Subscription, SubscriptionConfig, SubscriptionHandle, TopicRegistry};
use crate::types::{ConnectionState, EventEnvelope};

/// Topic on which every state transition is broadcast.
pub const STATUS_TOPIC: &str = "status_change";

/// Receives every inbound envelope that parsed successfully.
pub trait EnvelopeHandler: Send + Sync {
    fn handle(&self, envelope: EventEnvelope);
}

/// Payload of a `status_change` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ConnectionState,
    /// Retries scheduled since the last successful handshake or manual connect.
    pub attempt: u32,
    /// True once retries are exhausted; only a manual connect recovers.
    pub exhausted: bool,
}

impl StatusChange {
    /// Extract the status payload from a `status_change` envelope.
    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        if envelope.event_type != STATUS_TOPIC {
            return None;
        }
        serde_json::from_value(envelope.data.clone()).ok()
    }
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
}

/// Mutable connection state.
struct Inner {
    state: ConnectionState,
    attempts: u32,
    exhausted: bool,
    /// Bumped on every new attempt and on disconnect; results tagged with an
    /// older generation are discarded.
    generation: u64,
    retry_timer: Option<JoinHandle<()>>,
    link: Option<ActiveLink>,
}

impl Inner {
    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.reader.abort();
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Option<StatusChange> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(self.status_change())
    }

    fn status_change(&self) -> StatusChange {
        StatusChange {
            status: self.state,
            attempt: self.attempts,
            exhausted: self.exhausted,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_retry();
        self.drop_link();
    }
}

/// Owns the push-event connection.
///
/// Never blocks and never surfaces transport failures to callers: handshake
/// results, link errors and closes all arrive on Tokio tasks and become state
/// transitions, broadcast on [`STATUS_TOPIC`].
///
/// # State machine
///
/// ```text
/// disconnected --connect()--> connecting --handshake ok--> connected
/// connecting --handshake fail--> error --retry timer--> connecting
/// connected --closed--> disconnected --retry timer--> connecting
/// any --disconnect()--> disconnected
/// ```
///
/// Methods that start work (`connect`, `reconnect`, and anything that arms a
/// retry) must run inside a Tokio runtime.
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<TopicRegistry<EventEnvelope>>,
    handler: Arc<dyn EnvelopeHandler>,
    inner: Mutex<Inner>,
    this: Weak<Self>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<TopicRegistry<EventEnvelope>>,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            transport,
            registry,
            handler,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                attempts: 0,
                exhausted: false,
                generation: 0,
                retry_timer: None,
                link: None,
            }),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Retries scheduled since the last successful handshake or manual connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Whether automatic retries have given up.
    pub fn is_exhausted(&self) -> bool {
        self.inner.lock().exhausted
    }

    /// Whether a retry timer is pending.
    pub fn has_pending_retry(&self) -> bool {
        self.inner.lock().retry_timer.is_some()
    }

    /// Register a callback for `topic` (`status_change`, an event type, or `all`).
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, callback)
    }

    /// Register a bounded channel for `topic`.
    pub fn subscribe_channel(
        &self,
        topic: &str,
        config: SubscriptionConfig,
    ) -> SubscriptionHandle<EventEnvelope> {
        self.registry.subscribe_channel(topic, config)
    }

    /// Open the connection.
    ///
    /// Resets the retry counter and cancels a pending retry. A no-op (apart
    /// from the reset) while a handshake is in flight or the link is up.
    pub fn connect(&self) {
        let changes = {
            let mut inner = self.inner.lock();
            inner.attempts = 0;
            inner.exhausted = false;

            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) && inner.retry_timer.is_none()
            {
                debug!(state = %inner.state, "Connect requested while already active");
                return;
            }

            inner.cancel_retry();
            self.start_attempt(&mut inner)
        };
        self.emit(changes);
    }

    /// Drop the current link (if any) and start a fresh handshake, resetting
    /// the retry counter and cancelling a pending retry.
    pub fn reconnect(&self) {
        let changes = {
            let mut inner = self.inner.lock();
            inner.cancel_retry();
            inner.attempts = 0;
            inner.exhausted = false;
            self.start_attempt(&mut inner)
        };
        self.emit(changes);
    }

    /// Close the connection and cancel any pending retry. Idempotent.
    pub fn disconnect(&self) {
        let change = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.cancel_retry();
            inner.drop_link();
            inner.attempts = 0;
            inner.exhausted = false;
            inner.transition(ConnectionState::Disconnected)
        };

        if change.is_some() {
            info!(url = %self.config.url, "Disconnected");
        }
        self.emit(change);
    }

    /// Serialize `message` to JSON and send it over the open link.
    ///
    /// Returns false (after logging a warning) when not connected.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        let inner = self.inner.lock();
        match (&inner.link, inner.state) {
            (Some(link), ConnectionState::Connected) => link.outbound.send(text).is_ok(),
            _ => {
                warn!(state = %inner.state, "Not connected, dropping outbound message");
                false
            }
        }
    }

    // --- Internal transitions ---

    fn start_attempt(&self, inner: &mut Inner) -> Vec<StatusChange> {
        inner.generation += 1;
        inner.drop_link();
        let generation = inner.generation;

        let changes: Vec<StatusChange> = inner
            .transition(ConnectionState::Connecting)
            .into_iter()
            .collect();

        let this = self.this.clone();
        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout();

        debug!(url = %url, generation, attempt = inner.attempts, "Starting handshake");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Transport(format!(
                    "handshake timed out after {} ms",
                    timeout.as_millis()
                ))),
            };

            if let Some(this) = this.upgrade() {
                this.on_handshake(generation, result);
            }
        });

        changes
    }

    fn on_handshake(&self, generation: u64, result: Result<TransportLink>) {
        let changes = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                debug!(generation, "Discarding stale handshake result");
                return;
            }

            match result {
                Ok(link) => {
                    inner.attempts = 0;
                    inner.exhausted = false;
                    let reader = self.spawn_reader(generation, link.inbound);
                    inner.link = Some(ActiveLink {
                        outbound: link.outbound,
                        reader,
                    });
                    info!(url = %self.config.url, "Connected");
                    inner
                        .transition(ConnectionState::Connected)
                        .into_iter()
                        .collect()
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "Handshake failed");
                    let mut changes: Vec<StatusChange> = inner
                        .transition(ConnectionState::Error)
                        .into_iter()
                        .collect();
                    changes.extend(self.schedule_retry(&mut inner));
                    changes
                }
            }
        };
        self.emit(changes);
    }

    fn spawn_reader(
        &self,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<TransportFrame>,
    ) -> JoinHandle<()> {
        let this = self.this.clone();

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let Some(manager) = this.upgrade() else {
                    return;
                };
                match frame {
                    TransportFrame::Text(text) => manager.handle_frame(generation, &text),
                    TransportFrame::Error(reason) => manager.on_link_error(generation, &reason),
                    TransportFrame::Closed(reason) => {
                        manager.on_link_closed(generation, reason);
                        return;
                    }
                }
            }

            if let Some(manager) = this.upgrade() {
                manager.on_link_closed(generation, None);
            }
        })
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        if self.inner.lock().generation != generation {
            return;
        }

        match EventEnvelope::parse(text) {
            Ok(envelope) => {
                debug!(event_type = %envelope.event_type, "Frame received");
                self.handler.handle(envelope);
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    fn on_link_error(&self, generation: u64, reason: &str) {
        let change = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            warn!(url = %self.config.url, reason, "Transport error");
            inner.transition(ConnectionState::Error)
        };
        self.emit(change);
    }

    fn on_link_closed(&self, generation: u64, reason: Option<String>) {
        let changes = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            // Called from the reader itself, so detach rather than abort.
            inner.link = None;
            info!(url = %self.config.url, reason = ?reason, "Connection closed");

            let mut changes: Vec<StatusChange> = inner
                .transition(ConnectionState::Disconnected)
                .into_iter()
                .collect();
            changes.extend(self.schedule_retry(&mut inner));
            changes
        };
        self.emit(changes);
    }

    fn schedule_retry(&self, inner: &mut Inner) -> Vec<StatusChange> {
        if !self.config.auto_reconnect {
            return Vec::new();
        }

        if !self.config.should_retry(inner.attempts) {
            if inner.exhausted {
                return Vec::new();
            }
            inner.exhausted = true;
            inner.state = ConnectionState::Error;
            let e = PipelineError::ExhaustedRetries(inner.attempts);
            error!(url = %self.config.url, error = %e, "Giving up; manual reconnect required");
            return vec![inner.status_change()];
        }

        inner.attempts += 1;
        let attempt = inner.attempts;
        let delay = self.config.reconnect_delay(attempt);
        let generation = inner.generation;
        let this = self.this.clone();

        info!(
            attempt,
            max_attempts = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        inner.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = this.upgrade() {
                manager.on_retry_timer(generation);
            }
        }));

        Vec::new()
    }

    fn on_retry_timer(&self, generation: u64) {
        let changes = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            // The timer is the running task; detach its handle.
            inner.retry_timer = None;
            self.start_attempt(&mut inner)
        };
        self.emit(changes);
    }

    /// Broadcast status changes. Must be called without holding `inner`.
    fn emit(&self, changes: impl IntoIterator<Item = StatusChange>) {
        for change in changes {
            debug!(status = %change.status, attempt = change.attempt, exhausted = change.exhausted, "Status change");
            let data = serde_json::to_value(&change).unwrap_or_default();
            let envelope = EventEnvelope::new(STATUS_TOPIC, data);
            self.registry.publish(STATUS_TOPIC, &envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockTransport;
    use std::time::Duration;

    struct NullHandler;

    impl EnvelopeHandler for NullHandler {
        fn handle(&self, _envelope: EventEnvelope) {}
    }

    fn manager(transport: Arc<MockTransport>) -> Arc<ConnectionManager> {
        ConnectionManager::new(
            ConnectionConfig::new("ws://test/feed"),
            transport,
            TopicRegistry::new(),
            Arc::new(NullHandler),
        )
    }

    #[test]
    fn test_status_change_from_envelope() {
        let change = StatusChange {
            status: ConnectionState::Connected,
            attempt: 0,
            exhausted: false,
        };
        let envelope = EventEnvelope::new(STATUS_TOPIC, serde_json::to_value(&change).unwrap());

        assert_eq!(StatusChange::from_envelope(&envelope), Some(change));
        assert_eq!(envelope.data["status"], "connected");

        let other = EventEnvelope::new("new_order", envelope.data.clone());
        assert!(StatusChange::from_envelope(&other).is_none());
    }

    #[test]
    fn test_starts_disconnected() {
        let manager = manager(MockTransport::accepting());
        assert_eq!(manager.status(), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_attempts(), 0);
        assert!(!manager.send(&serde_json::json!({"type": "ping"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_send() {
        let transport = MockTransport::accepting();
        let manager = manager(Arc::clone(&transport));

        manager.connect();
        assert_eq!(manager.status(), ConnectionState::Connecting);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status(), ConnectionState::Connected);

        assert!(manager.send(&serde_json::json!({"type": "ping"})));
        let peer = transport.last_peer().unwrap();
        assert_eq!(peer.try_recv_sent().as_deref(), Some(r#"{"type":"ping"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connected_is_noop() {
        let transport = MockTransport::accepting();
        let manager = manager(Arc::clone(&transport));

        manager.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.status(), ConnectionState::Connected);
    }
}
