//! Topic-keyed registry for broadcasting values to subscribers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::types::{Callback, Subscription, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Where a registration delivers values.
enum Sink<T> {
    Callback(Callback<T>),
    Channel(Sender<T>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Callback(cb) => Sink::Callback(Arc::clone(cb)),
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
        }
    }
}

/// Internal registration state.
struct Registration<T> {
    id: SubscriptionId,
    sink: Sink<T>,
}

/// Topic-keyed multimap of subscribers.
///
/// Publishing takes a snapshot of the registrations for a topic and releases
/// the lock before delivering, so callbacks are free to subscribe, unsubscribe
/// or publish again.
pub struct TopicRegistry<T> {
    /// Registrations by topic, in subscription order.
    topics: RwLock<HashMap<String, Vec<Registration<T>>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> TopicRegistry<T> {
    /// Create a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a callback for `topic`.
    pub fn subscribe<F>(self: &Arc<Self>, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(topic, Sink::Callback(Arc::new(callback)))
    }

    /// Register a bounded channel for `topic`.
    ///
    /// A subscriber whose buffer fills up is dropped.
    pub fn subscribe_channel(
        self: &Arc<Self>,
        topic: &str,
        config: SubscriptionConfig,
    ) -> SubscriptionHandle<T> {
        let (sender, receiver) = bounded(config.buffer_size);
        let subscription = self.register(topic, Sink::Channel(sender));
        SubscriptionHandle {
            subscription,
            receiver,
        }
    }

    fn register(self: &Arc<Self>, topic: &str, sink: Sink<T>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Registration { id, sink });

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription::new(
            id,
            topic.to_string(),
            Box::new(move || match registry.upgrade() {
                Some(registry) => registry.unsubscribe(id),
                None => false,
            }),
        )
    }

    /// Remove a single registration. Returns false if it was not found.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write();
        let mut emptied = None;
        let mut removed = false;

        for (topic, registrations) in topics.iter_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(pos);
                removed = true;
                if registrations.is_empty() {
                    emptied = Some(topic.clone());
                }
                break;
            }
        }

        if let Some(topic) = emptied {
            topics.remove(&topic);
        }
        removed
    }

    /// Deliver `value` to every subscriber of `topic`. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, topic: &str, value: &T) -> usize {
        let sinks: Vec<(SubscriptionId, Sink<T>)> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.id, r.sink.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut to_remove = Vec::new();

        for (id, sink) in sinks {
            match sink {
                Sink::Callback(callback) => {
                    callback(value);
                    delivered += 1;
                }
                Sink::Channel(sender) => match sender.try_send(value.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(topic, subscription = id.0, "Dropping slow subscriber");
                        to_remove.push(id);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        debug!(topic, subscription = id.0, "Receiver gone, dropping subscriber");
                        to_remove.push(id);
                    }
                },
            }
        }

        for id in to_remove {
            self.unsubscribe(id);
        }

        delivered
    }

    /// Number of subscribers registered for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Number of subscribers across all topics.
    pub fn total_subscribers(&self) -> usize {
        self.topics.read().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let registry = TopicRegistry::<u32>::new();

        let sub = registry.subscribe("orders", |_| {});
        assert_eq!(registry.subscriber_count("orders"), 1);

        assert!(sub.unsubscribe());
        assert_eq!(registry.subscriber_count("orders"), 0);
        assert_eq!(registry.total_subscribers(), 0);
    }

    #[test]
    fn test_unsubscribe_removes_only_its_registration() {
        let registry = TopicRegistry::<u32>::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        // Two registrations of behaviourally identical callbacks.
        let h1 = Arc::clone(&hits);
        let first = registry.subscribe("t", move |v| h1.lock().push(("first", *v)));
        let h2 = Arc::clone(&hits);
        let _second = registry.subscribe("t", move |v| h2.lock().push(("second", *v)));

        first.unsubscribe();
        registry.publish("t", &7);

        assert_eq!(*hits.lock(), vec![("second", 7)]);
    }

    #[test]
    fn test_publish_filters_by_topic() {
        let registry = TopicRegistry::<u32>::new();
        let hits = Arc::new(Mutex::new(0));

        let h = Arc::clone(&hits);
        let _sub = registry.subscribe("a", move |_| *h.lock() += 1);

        assert_eq!(registry.publish("b", &1), 0);
        assert_eq!(registry.publish("a", &1), 1);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_callback_can_unsubscribe_during_publish() {
        let registry = TopicRegistry::<u32>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&slot);
        let sub = registry.subscribe("t", move |_| {
            if let Some(sub) = inner.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        assert_eq!(registry.publish("t", &1), 1);
        assert_eq!(registry.subscriber_count("t"), 0);
        assert_eq!(registry.publish("t", &2), 0);
    }

    #[test]
    fn test_channel_subscription_receives() {
        let registry = TopicRegistry::<String>::new();
        let handle = registry.subscribe_channel("t", SubscriptionConfig::default());

        registry.publish("t", &"hello".to_string());

        let value = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let registry = TopicRegistry::<u32>::new();
        let _handle = registry.subscribe_channel("t", SubscriptionConfig { buffer_size: 2 });

        for i in 0..10 {
            registry.publish("t", &i);
        }

        assert_eq!(registry.subscriber_count("t"), 0);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = TopicRegistry::<u32>::new();
        let sub = registry.subscribe("t", |_| {});
        drop(registry);
        assert!(!sub.unsubscribe());
    }
}
