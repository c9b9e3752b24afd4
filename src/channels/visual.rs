//! Visual channel: transient toasts.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::config::ChannelConfig;
use super::platform::{Toast, ToastLevel, ToastSurface};
use crate::types::{Alert, Rank};

/// Lifetime of a non-alert toast.
pub const MESSAGE_TOAST_DURATION: Duration = Duration::from_secs(4);

/// Lifetime of an error toast.
pub const ERROR_TOAST_DURATION: Duration = Duration::from_secs(6);

pub struct VisualChannel {
    surface: Arc<dyn ToastSurface>,
}

impl VisualChannel {
    pub fn new(surface: Arc<dyn ToastSurface>) -> Self {
        Self { surface }
    }

    /// How long an alert toast stays up.
    pub fn duration_for(rank: Rank) -> Duration {
        match rank {
            Rank::Low => Duration::from_secs(3),
            Rank::Medium => Duration::from_secs(5),
            Rank::High => Duration::from_secs(8),
        }
    }

    pub fn level_for(rank: Rank) -> ToastLevel {
        match rank {
            Rank::Low => ToastLevel::Info,
            Rank::Medium => ToastLevel::Warning,
            Rank::High => ToastLevel::Error,
        }
    }

    pub fn notify(&self, alert: &Alert, config: &ChannelConfig) {
        if !config.enabled {
            return;
        }
        self.deliver(Toast {
            message: alert.message.clone(),
            level: Self::level_for(alert.rank),
            duration: Self::duration_for(alert.rank),
        });
    }

    /// Show a plain message toast.
    pub fn show(&self, message: impl Into<String>, level: ToastLevel, config: &ChannelConfig) {
        if config.enabled {
            self.notice(message, level);
        }
    }

    /// Show a message toast whatever the channel's toggle says.
    pub fn notice(&self, message: impl Into<String>, level: ToastLevel) {
        let duration = match level {
            ToastLevel::Error => ERROR_TOAST_DURATION,
            _ => MESSAGE_TOAST_DURATION,
        };
        self.deliver(Toast {
            message: message.into(),
            level,
            duration,
        });
    }

    pub fn test(&self) {
        self.deliver(Toast {
            message: "Visual notifications are working".to_string(),
            level: ToastLevel::Info,
            duration: MESSAGE_TOAST_DURATION,
        });
    }

    fn deliver(&self, toast: Toast) {
        if let Err(e) = self.surface.show(&toast) {
            warn!(channel = "visual", error = %e, "Toast failed");
        }
    }
}
