//! Subscription types shared by the connection, router and alert store.

use std::fmt;
use std::sync::Arc;

/// Callback invoked for every value published on a topic.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Unique identifier for a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Configuration for a channel-backed subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered values before the subscriber is dropped.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

type Cancel = Box<dyn FnOnce() -> bool + Send + Sync>;

/// Token returned by every `subscribe` call.
///
/// Removes exactly the registration it was issued for. Dropping the token
/// without calling [`Subscription::unsubscribe`] leaves the registration in
/// place.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    cancel: Option<Cancel>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, topic: String, cancel: Cancel) -> Self {
        Self {
            id,
            topic,
            cancel: Some(cancel),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the registration. Returns false if it was already gone
    /// (e.g. dropped for overflow, or the registry no longer exists).
    pub fn unsubscribe(mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => cancel(),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Handle for a channel-backed subscription.
pub struct SubscriptionHandle<T> {
    pub subscription: Subscription,
    /// Channel to receive values.
    pub receiver: crossbeam_channel::Receiver<T>,
}

impl<T> SubscriptionHandle<T> {
    /// Receive the next value (blocking).
    pub fn recv(&self) -> Result<T, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a value (non-blocking).
    pub fn try_recv(&self) -> Result<T, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<T, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Stop receiving and drop the registration.
    pub fn unsubscribe(self) -> bool {
        self.subscription.unsubscribe()
    }
}
