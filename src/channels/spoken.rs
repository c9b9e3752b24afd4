//! Spoken channel: one sentence per alert through the speech engine.

use std::sync::Arc;
use tracing::warn;

use super::config::ChannelConfig;
use super::platform::{SpeechEngine, Utterance};
use crate::types::{Alert, Rank};

pub const DEFAULT_SPEECH_RATE: f32 = 1.0;
pub const DEFAULT_SPEECH_PITCH: f32 = 1.0;
pub const DEFAULT_SPEECH_VOLUME: f32 = 0.8;

pub struct SpokenChannel {
    engine: Arc<dyn SpeechEngine>,
}

impl SpokenChannel {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }

    /// Sentence spoken for `alert`.
    pub fn compose(alert: &Alert) -> String {
        let lead = match alert.rank {
            Rank::High => "High priority alert.",
            Rank::Medium => "Alert.",
            Rank::Low => "Notice.",
        };
        let body = alert.message.trim().trim_end_matches('.');

        let mut text = format!("{lead} {body}.");
        match alert.current_stock {
            Some(stock) if stock <= 0 => text.push_str(" Product is out of stock."),
            Some(stock) => text.push_str(&format!(" Only {stock} units remaining.")),
            None => {}
        }
        text
    }

    /// Speak `alert`. High rank interrupts whatever is being spoken; lower
    /// ranks queue behind it.
    pub fn notify(&self, alert: &Alert, config: &ChannelConfig) {
        if !config.enabled {
            return;
        }

        if alert.rank == Rank::High {
            if let Err(e) = self.engine.cancel() {
                warn!(channel = "spoken", error = %e, "Failed to cancel speech");
            }
        }
        self.speak(Self::compose(alert), config);
    }

    pub fn test(&self, config: &ChannelConfig) {
        self.speak("Voice alerts are working.".to_string(), config);
    }

    fn speak(&self, text: String, config: &ChannelConfig) {
        let utterance = Utterance {
            text,
            rate: config.rate_or(DEFAULT_SPEECH_RATE),
            pitch: config.pitch_or(DEFAULT_SPEECH_PITCH),
            volume: config.volume_or(DEFAULT_SPEECH_VOLUME),
        };
        if let Err(e) = self.engine.speak(&utterance) {
            warn!(channel = "spoken", error = %e, "Speech failed");
        }
    }
}
