//! In-process publish/subscribe used across the pipeline.
//!
//! A [`TopicRegistry`] is a topic-keyed multimap. Every `subscribe` call
//! returns a [`Subscription`] token that removes exactly that registration,
//! so two identical callbacks can be registered and removed independently.
//!
//! Subscribers are either callbacks (run synchronously on the publishing
//! path) or bounded channels (dropped when their buffer overflows).
//!
//! # Example
//!
//! ```ignore
//! let registry = TopicRegistry::<EventEnvelope>::new();
//!
//! let sub = registry.subscribe("new_order", |envelope| {
//!     println!("order: {}", envelope.data);
//! });
//!
//! registry.publish("new_order", &envelope);
//! sub.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::TopicRegistry;
pub use types::{Callback, Subscription, SubscriptionConfig, SubscriptionHandle, SubscriptionId};
