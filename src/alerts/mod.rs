//! Alert collection.
//!
//! [`AlertStore`] turns raw `inventory_alert` payloads into ranked
//! [`Alert`](crate::types::Alert)s, keeps them until they are removed, cleared
//! or (low rank only) expire, and publishes a snapshot to listeners after
//! every change.

mod config;
mod store;

pub use config::AlertStoreConfig;
pub use store::{derive_subject, AlertStore, ALERTS_TOPIC};
