//! Alert store: ranked alerts with listener snapshots and low-rank expiry.

use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::AlertStoreConfig;
use crate::channels::NotificationChannels;
use crate::subscriptions::{Subscription, SubscriptionConfig, SubscriptionHandle, TopicRegistry};
use crate::types::{Alert, AlertId, Rank, RawAlert, Timestamp};

/// Topic on which collection snapshots are delivered.
pub const ALERTS_TOPIC: &str = "alerts";

/// `"<subject>: <name> <phrase>"`, e.g. `"Low stock: Blue Hoodie is running low"`.
static SUBJECT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[^:]+:\s*(?P<name>.+?)\s+(?:is|are|has|have|was|were|only|running|out)\b",
    )
    .ok()
});

/// Derive a subject name from an alert message.
pub fn derive_subject(message: &str) -> Option<String> {
    let pattern = SUBJECT_PATTERN.as_ref()?;
    let name = pattern.captures(message)?.name("name")?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[derive(Default)]
struct Delivery {
    pending: VecDeque<Vec<Alert>>,
    draining: bool,
}

struct AlertEntry {
    alert: Alert,
    /// Pending expiry timer, for low-rank alerts.
    expiry: Option<JoinHandle<()>>,
}

impl AlertEntry {
    fn cancel_expiry(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

/// Owns the alert collection.
///
/// Every mutation publishes a snapshot of the whole collection (most recent
/// first) on [`ALERTS_TOPIC`] after the internal lock is released, so a
/// listener may call back into the store. Snapshots reach each listener in
/// mutation order, so the last one a listener sees is the current state. Each successful ingest is also
/// handed to the [`NotificationChannels`], when attached.
pub struct AlertStore {
    config: AlertStoreConfig,
    entries: Mutex<HashMap<AlertId, AlertEntry>>,
    next_id: AtomicU64,
    listeners: Arc<TopicRegistry<Vec<Alert>>>,
    delivery: Mutex<Delivery>,
    channels: Option<Arc<NotificationChannels>>,
    this: Weak<Self>,
}

impl AlertStore {
    /// A store without notification fan-out.
    pub fn new(config: AlertStoreConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// A store that notifies `channels` on every ingest.
    pub fn with_channels(
        config: AlertStoreConfig,
        channels: Arc<NotificationChannels>,
    ) -> Arc<Self> {
        Self::build(config, Some(channels))
    }

    fn build(config: AlertStoreConfig, channels: Option<Arc<NotificationChannels>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            listeners: TopicRegistry::new(),
            delivery: Mutex::new(Delivery::default()),
            channels,
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &AlertStoreConfig {
        &self.config
    }

    /// Normalize, store and announce a raw alert.
    ///
    /// Low-rank alerts arm an expiry timer, which needs a Tokio runtime;
    /// outside one they are kept until removed.
    pub fn ingest(&self, raw: RawAlert) -> Alert {
        let id = AlertId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let rank = Rank::from_severity(raw.severity.as_deref());
        let subject_name = raw
            .product_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| derive_subject(&raw.message));

        let alert = Alert {
            id,
            message: raw.message,
            rank,
            subject_name,
            product_id: raw.product_id,
            current_stock: raw.current_stock,
            created_at: Timestamp::now(),
            acknowledged: false,
        };

        {
            let mut entries = self.entries.lock();
            let expiry = if rank == Rank::Low {
                self.spawn_expiry(id)
            } else {
                None
            };
            entries.insert(
                id,
                AlertEntry {
                    alert: alert.clone(),
                    expiry,
                },
            );
            self.enqueue(Self::snapshot(&entries));
        }

        info!(id = %id, rank = %rank, subject = ?alert.subject_name, "Alert ingested");
        self.deliver();

        if let Some(channels) = &self.channels {
            channels.notify(&alert);
        }
        alert
    }

    /// Mark an alert as acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&self, id: AlertId) -> bool {
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&id) else {
                return false;
            };
            if entry.alert.acknowledged {
                return true;
            }
            entry.alert.acknowledged = true;
            self.enqueue(Self::snapshot(&entries));
        }

        debug!(id = %id, "Alert acknowledged");
        self.deliver();
        true
    }

    /// Delete an alert, cancelling its expiry timer. Returns false for
    /// unknown ids.
    pub fn remove(&self, id: AlertId) -> bool {
        {
            let mut entries = self.entries.lock();
            let Some(mut entry) = entries.remove(&id) else {
                return false;
            };
            entry.cancel_expiry();
            self.enqueue(Self::snapshot(&entries));
        }

        debug!(id = %id, "Alert removed");
        self.deliver();
        true
    }

    /// Delete every alert, cancelling all expiry timers. Returns how many
    /// were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            for entry in entries.values_mut() {
                entry.cancel_expiry();
            }
            let removed = entries.len();
            entries.clear();
            if removed > 0 {
                self.enqueue(Vec::new());
            }
            removed
        };

        if removed > 0 {
            debug!(removed, "Alerts cleared");
            self.deliver();
        }
        removed
    }

    /// All alerts, most recent first.
    pub fn alerts(&self) -> Vec<Alert> {
        Self::snapshot(&self.entries.lock())
    }

    pub fn unacknowledged_alerts(&self) -> Vec<Alert> {
        let mut alerts = self.alerts();
        alerts.retain(|alert| !alert.acknowledged);
        alerts
    }

    pub fn alert_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.alert.acknowledged)
            .count()
    }

    pub fn get(&self, id: AlertId) -> Option<Alert> {
        self.entries.lock().get(&id).map(|entry| entry.alert.clone())
    }

    /// Whether `id` has an expiry timer pending.
    pub fn has_pending_expiry(&self, id: AlertId) -> bool {
        self.entries
            .lock()
            .get(&id)
            .is_some_and(|entry| entry.expiry.is_some())
    }

    /// Receive a snapshot after every mutation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Alert]) + Send + Sync + 'static,
    {
        self.listeners
            .subscribe(ALERTS_TOPIC, move |alerts: &Vec<Alert>| callback(alerts))
    }

    /// Receive snapshots on a bounded channel.
    pub fn subscribe_channel(&self, config: SubscriptionConfig) -> SubscriptionHandle<Vec<Alert>> {
        self.listeners.subscribe_channel(ALERTS_TOPIC, config)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.subscriber_count(ALERTS_TOPIC)
    }

    // --- Internal ---

    fn spawn_expiry(&self, id: AlertId) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(id = %id, "No runtime; low-rank alert will not expire");
            return None;
        };

        let this = self.this.clone();
        let delay = self.config.low_expiry();
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = this.upgrade() {
                store.expire(id);
            }
        }))
    }

    fn expire(&self, id: AlertId) {
        {
            let mut entries = self.entries.lock();
            // May already be gone through remove or clear.
            let Some(entry) = entries.remove(&id) else {
                return;
            };
            // The timer is the running task; its handle is dropped, not aborted.
            drop(entry);
            self.enqueue(Self::snapshot(&entries));
        }

        debug!(id = %id, "Low-rank alert expired");
        self.deliver();
    }

    fn snapshot(entries: &HashMap<AlertId, AlertEntry>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = entries.values().map(|entry| entry.alert.clone()).collect();
        alerts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        alerts
    }

    /// Queue a snapshot for delivery. Called with `entries` held, so the
    /// queue order matches the mutation order.
    fn enqueue(&self, snapshot: Vec<Alert>) {
        self.delivery.lock().pending.push_back(snapshot);
    }

    /// Deliver queued snapshots in order. Must be called without holding
    /// `entries`.
    ///
    /// Only one caller drains at a time. A mutation made from inside a
    /// listener, or on another thread while a drain is running, only queues
    /// its snapshot and the running drain delivers it after the current one
    /// has reached every listener.
    fn deliver(&self) {
        {
            let mut delivery = self.delivery.lock();
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }

        loop {
            let next = {
                let mut delivery = self.delivery.lock();
                let next = delivery.pending.pop_front();
                if next.is_none() {
                    delivery.draining = false;
                }
                next
            };
            let Some(snapshot) = next else {
                return;
            };
            self.listeners.publish(ALERTS_TOPIC, &snapshot);
        }
    }
}

impl Drop for AlertStore {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values_mut() {
            entry.cancel_expiry();
        }
    }
}
