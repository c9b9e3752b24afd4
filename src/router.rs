//! Event router: built-in handling plus topic fan-out for inbound envelopes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alerts::AlertStore;
use crate::channels::{BannerContent, NotificationChannels, ToastLevel};
use crate::connection::EnvelopeHandler;
use crate::subscriptions::TopicRegistry;
use crate::types::{lenient_string, EventEnvelope, RawAlert};

/// Topic that receives every routed envelope.
pub const WILDCARD_TOPIC: &str = "all";

/// Flash-sale updates arrive as a `system_notification` with this `data.type`.
pub const FLASH_SALE_UPDATE: &str = "flash_sale_update";

/// Event types with built-in handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NewOrder,
    OrderUpdated,
    SalesUpdate,
    InventoryAlert,
    SystemNotification,
    Other,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "new_order" => EventKind::NewOrder,
            "order_updated" => EventKind::OrderUpdated,
            "sales_update" => EventKind::SalesUpdate,
            "inventory_alert" => EventKind::InventoryAlert,
            "system_notification" => EventKind::SystemNotification,
            _ => EventKind::Other,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,
}

impl CustomerInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// The `order` object of `new_order` and `order_updated` payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", default)]
    pub id: String,

    /// Either a string or a number on the wire.
    #[serde(deserialize_with = "lenient_string")]
    pub order_number: String,

    #[serde(default)]
    pub total_amount: Option<f64>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub customer_info: CustomerInfo,

    #[serde(default)]
    pub items: Vec<Value>,
}

#[derive(Deserialize)]
struct OrderPayload {
    order: Order,
}

/// Latest dashboard figures from a `sales_update`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    #[serde(default)]
    pub total_sales: f64,

    #[serde(default)]
    pub total_orders: u64,

    #[serde(default)]
    pub active_users: u64,

    #[serde(default)]
    pub growth: f64,

    #[serde(default)]
    pub recent_orders: Vec<Value>,
}

#[derive(Deserialize)]
struct SystemNotification {
    #[serde(rename = "type", default)]
    kind: Option<String>,

    #[serde(default)]
    message: Option<String>,

    #[serde(default)]
    sales: Vec<Value>,
}

/// Routes parsed envelopes.
///
/// For each envelope the router runs the built-in handler for its type (if
/// any), then delivers it to subscribers of the type and to subscribers of
/// [`WILDCARD_TOPIC`]. A payload that does not fit its type's shape is
/// logged and skips the built-in handler only.
pub struct EventRouter {
    registry: Arc<TopicRegistry<EventEnvelope>>,
    alerts: Arc<AlertStore>,
    channels: Arc<NotificationChannels>,
    metrics: RwLock<Option<DashboardMetrics>>,
    flash_sales: RwLock<Vec<Value>>,
    routed: AtomicU64,
}

impl EventRouter {
    pub fn new(
        registry: Arc<TopicRegistry<EventEnvelope>>,
        alerts: Arc<AlertStore>,
        channels: Arc<NotificationChannels>,
    ) -> Self {
        Self {
            registry,
            alerts,
            channels,
            metrics: RwLock::new(None),
            flash_sales: RwLock::new(Vec::new()),
            routed: AtomicU64::new(0),
        }
    }

    /// Route one envelope. Returns the number of subscriber deliveries.
    pub fn route(&self, envelope: &EventEnvelope) -> usize {
        self.routed.fetch_add(1, Ordering::Relaxed);
        self.handle_builtin(envelope);

        let mut delivered = self.registry.publish(&envelope.event_type, envelope);
        if envelope.event_type != WILDCARD_TOPIC {
            delivered += self.registry.publish(WILDCARD_TOPIC, envelope);
        }

        debug!(event_type = %envelope.event_type, delivered, "Envelope routed");
        delivered
    }

    /// Most recent `sales_update` figures.
    pub fn latest_metrics(&self) -> Option<DashboardMetrics> {
        self.metrics.read().clone()
    }

    /// Active flash sales from the most recent update.
    pub fn flash_sales(&self) -> Vec<Value> {
        self.flash_sales.read().clone()
    }

    /// Envelopes routed so far.
    pub fn routed_count(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    fn handle_builtin(&self, envelope: &EventEnvelope) {
        let kind = EventKind::from_type(&envelope.event_type);
        let result = match kind {
            EventKind::NewOrder => self.on_new_order(&envelope.data),
            EventKind::OrderUpdated => self.on_order_updated(&envelope.data),
            EventKind::SalesUpdate => self.on_sales_update(&envelope.data),
            EventKind::InventoryAlert => self.on_inventory_alert(&envelope.data),
            EventKind::SystemNotification => self.on_system_notification(&envelope.data),
            EventKind::Other => Ok(()),
        };

        if let Err(e) = result {
            warn!(
                event_type = %envelope.event_type,
                error = %e,
                "Payload does not match its event type; skipping built-in handling"
            );
        }
    }

    fn on_new_order(&self, data: &Value) -> serde_json::Result<()> {
        let OrderPayload { order } = OrderPayload::deserialize(data)?;
        let customer = order.customer_info.full_name();

        let message = if customer.is_empty() {
            format!("New order #{}", order.order_number)
        } else {
            format!("New order #{} from {}", order.order_number, customer)
        };
        self.channels.toast(message, ToastLevel::Success);

        self.channels.show_order_banner(BannerContent {
            order_number: order.order_number,
            customer,
            total: order.total_amount,
            item_count: order.items.len(),
        });
        Ok(())
    }

    fn on_order_updated(&self, data: &Value) -> serde_json::Result<()> {
        let OrderPayload { order } = OrderPayload::deserialize(data)?;
        let message = match order.status.as_deref() {
            Some(status) if !status.is_empty() => {
                format!("Order #{} is now {}", order.order_number, status)
            }
            _ => format!("Order #{} was updated", order.order_number),
        };
        self.channels.toast(message, ToastLevel::Info);
        Ok(())
    }

    fn on_sales_update(&self, data: &Value) -> serde_json::Result<()> {
        let metrics = DashboardMetrics::deserialize(data)?;
        *self.metrics.write() = Some(metrics);
        Ok(())
    }

    fn on_inventory_alert(&self, data: &Value) -> serde_json::Result<()> {
        let raw = RawAlert::deserialize(data)?;
        self.alerts.ingest(raw);
        Ok(())
    }

    fn on_system_notification(&self, data: &Value) -> serde_json::Result<()> {
        let notification = SystemNotification::deserialize(data)?;

        if notification.kind.as_deref() == Some(FLASH_SALE_UPDATE) {
            let count = notification.sales.len();
            *self.flash_sales.write() = notification.sales;
            self.channels.toast(
                format!("Flash sales updated ({count} active)"),
                ToastLevel::Info,
            );
            return Ok(());
        }

        if let Some(message) = notification.message.filter(|m| !m.is_empty()) {
            self.channels.toast(message, ToastLevel::Info);
        }
        Ok(())
    }
}

impl EnvelopeHandler for EventRouter {
    fn handle(&self, envelope: EventEnvelope) {
        self.route(&envelope);
    }
}
