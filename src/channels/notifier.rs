//! Fan-out over all four channels, plus their shared configuration.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::banner::BannerChannel;
use super::config::{ChannelConfig, ChannelKind, ChannelSettings, SettingsStore};
use super::platform::{BannerContent, PlatformBackends, ToastLevel};
use super::spoken::SpokenChannel;
use super::tonal::{AudioOutput, TonalChannel};
use super::visual::VisualChannel;
use crate::types::Alert;

/// Owns the four channels and their settings.
///
/// Settings are read once per call, so a change takes effect on the next
/// `notify`. When a [`SettingsStore`] is attached every change is written
/// through to it.
pub struct NotificationChannels {
    settings: RwLock<ChannelSettings>,
    store: Option<SettingsStore>,
    visual: VisualChannel,
    spoken: SpokenChannel,
    tonal: TonalChannel,
    banner: Arc<BannerChannel>,
    audio: Arc<AudioOutput>,
}

impl NotificationChannels {
    /// Channels with default settings and no persistence.
    pub fn new(backends: PlatformBackends) -> Self {
        Self::build(backends, ChannelSettings::default(), None)
    }

    /// Channels whose settings are restored from, and saved to, `store`.
    ///
    /// A missing file yields defaults. An unreadable or corrupt file is
    /// logged and also yields defaults; it is overwritten on the next change.
    pub fn with_store(backends: PlatformBackends, store: SettingsStore) -> Self {
        let settings = match store.load() {
            Ok(Some(settings)) => {
                info!(path = %store.path().display(), "Restored channel settings");
                settings
            }
            Ok(None) => ChannelSettings::default(),
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "Ignoring unreadable channel settings");
                ChannelSettings::default()
            }
        };
        Self::build(backends, settings, Some(store))
    }

    fn build(
        backends: PlatformBackends,
        settings: ChannelSettings,
        store: Option<SettingsStore>,
    ) -> Self {
        let audio = Arc::new(AudioOutput::new(backends.audio));
        Self {
            settings: RwLock::new(settings),
            store,
            visual: VisualChannel::new(backends.toasts),
            spoken: SpokenChannel::new(backends.speech),
            tonal: TonalChannel::new(Arc::clone(&audio)),
            banner: BannerChannel::new(backends.banner, Arc::clone(&audio)),
            audio,
        }
    }

    /// Deliver `alert` on every enabled alert channel.
    pub fn notify(&self, alert: &Alert) {
        let settings = *self.settings.read();
        debug!(id = %alert.id, rank = %alert.rank, "Notifying channels");

        self.visual.notify(alert, &settings.visual);
        self.spoken.notify(alert, &settings.spoken);
        self.tonal.notify(alert, &settings.tonal);
    }

    /// Show a non-alert toast through the visual channel.
    pub fn toast(&self, message: impl Into<String>, level: ToastLevel) {
        let config = self.settings.read().visual;
        self.visual.show(message, level, &config);
    }

    /// Show a toast even when the visual channel is disabled. Reserved for
    /// failures the user has to see.
    pub fn notice(&self, message: impl Into<String>, level: ToastLevel) {
        self.visual.notice(message, level);
    }

    /// Raise the new-order banner. Returns false if it was not shown.
    pub fn show_order_banner(&self, content: BannerContent) -> bool {
        let config = self.settings.read().banner;
        self.banner.show(content, &config)
    }

    pub fn close_banner(&self) -> bool {
        self.banner.close()
    }

    pub fn banner(&self) -> &BannerChannel {
        &self.banner
    }

    /// Play or show a representative sample on one channel, even if it is
    /// disabled.
    pub fn test(&self, kind: ChannelKind) {
        let settings = *self.settings.read();
        match kind {
            ChannelKind::Visual => self.visual.test(),
            ChannelKind::Spoken => self.spoken.test(&settings.spoken),
            ChannelKind::Tonal => self.tonal.test(&settings.tonal),
            ChannelKind::Banner => {
                self.banner.test(&settings.banner);
            }
        }
    }

    pub fn config(&self, kind: ChannelKind) -> ChannelConfig {
        *self.settings.read().get(kind)
    }

    pub fn settings(&self) -> ChannelSettings {
        *self.settings.read()
    }

    pub fn set_enabled(&self, kind: ChannelKind, enabled: bool) {
        self.update(kind, |config| ChannelConfig { enabled, ..config });
    }

    pub fn set_volume(&self, kind: ChannelKind, volume: f32) {
        self.update(kind, |config| config.with_volume(volume));
    }

    pub fn set_rate(&self, kind: ChannelKind, rate: f32) {
        self.update(kind, |config| config.with_rate(rate));
    }

    pub fn set_pitch(&self, kind: ChannelKind, pitch: f32) {
        self.update(kind, |config| config.with_pitch(pitch));
    }

    /// Replace every channel's settings at once.
    pub fn replace_settings(&self, settings: ChannelSettings) {
        *self.settings.write() = settings;
        self.persist(&settings);
    }

    /// Drop the audio device. It is re-acquired on the next playback.
    pub fn release_audio(&self) {
        self.audio.release();
    }

    pub fn audio_acquired(&self) -> bool {
        self.audio.is_acquired()
    }

    fn update(&self, kind: ChannelKind, f: impl FnOnce(ChannelConfig) -> ChannelConfig) {
        let settings = {
            let mut settings = self.settings.write();
            let slot = settings.get_mut(kind);
            *slot = f(*slot);
            *settings
        };
        debug!(channel = %kind, config = ?settings.get(kind), "Channel settings changed");
        self.persist(&settings);
    }

    fn persist(&self, settings: &ChannelSettings) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(settings) {
                warn!(path = %store.path().display(), error = %e, "Failed to save channel settings");
            }
        }
    }
}

impl Drop for NotificationChannels {
    fn drop(&mut self) {
        self.banner.close();
        self.audio.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::headless::{HeadlessPlatform, PlatformCall};
    use crate::types::{AlertId, Rank, Timestamp};
    use tempfile::TempDir;

    fn alert(rank: Rank) -> Alert {
        Alert {
            id: AlertId(1),
            message: "Low stock: Blue Hoodie is running low".to_string(),
            rank,
            subject_name: Some("Blue Hoodie".to_string()),
            product_id: Some("p1".to_string()),
            current_stock: Some(2),
            created_at: Timestamp(0),
            acknowledged: false,
        }
    }

    #[test]
    fn test_notify_fans_out() {
        let platform = HeadlessPlatform::new();
        let channels = NotificationChannels::new(HeadlessPlatform::backends(&platform));

        channels.notify(&alert(Rank::High));

        assert_eq!(platform.toasts().len(), 1);
        assert_eq!(platform.utterances().len(), 1);
        assert_eq!(platform.tones(), vec![2]);
        assert!(platform.banners_shown().is_empty());
    }

    #[test]
    fn test_disable_takes_effect_on_next_call() {
        let platform = HeadlessPlatform::new();
        let channels = NotificationChannels::new(HeadlessPlatform::backends(&platform));

        channels.set_enabled(ChannelKind::Spoken, false);
        channels.set_enabled(ChannelKind::Tonal, false);
        channels.notify(&alert(Rank::Medium));

        assert_eq!(platform.toasts().len(), 1);
        assert!(platform.utterances().is_empty());
        assert!(platform.tones().is_empty());
        assert!(!channels.audio_acquired());
    }

    #[test]
    fn test_failed_channel_keeps_flag() {
        let platform = HeadlessPlatform::new();
        platform.set_speech_unavailable(true);
        let channels = NotificationChannels::new(HeadlessPlatform::backends(&platform));

        channels.notify(&alert(Rank::High));

        assert!(channels.config(ChannelKind::Spoken).enabled);
        assert_eq!(platform.toasts().len(), 1);
        assert_eq!(platform.tones(), vec![2]);
    }

    #[test]
    fn test_setters_clamp() {
        let platform = HeadlessPlatform::new();
        let channels = NotificationChannels::new(HeadlessPlatform::backends(&platform));

        channels.set_volume(ChannelKind::Tonal, 4.0);
        channels.set_rate(ChannelKind::Spoken, 0.0);
        channels.set_pitch(ChannelKind::Spoken, 9.0);

        assert_eq!(channels.config(ChannelKind::Tonal).volume, Some(1.0));
        assert_eq!(channels.config(ChannelKind::Spoken).rate, Some(0.1));
        assert_eq!(channels.config(ChannelKind::Spoken).pitch, Some(2.0));
    }

    #[test]
    fn test_settings_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels.bin");
        let platform = HeadlessPlatform::new();

        {
            let channels = NotificationChannels::with_store(
                HeadlessPlatform::backends(&platform),
                SettingsStore::new(&path),
            );
            channels.set_enabled(ChannelKind::Banner, false);
            channels.set_volume(ChannelKind::Spoken, 0.5);
        }

        let channels = NotificationChannels::with_store(
            HeadlessPlatform::backends(&platform),
            SettingsStore::new(&path),
        );
        assert!(!channels.config(ChannelKind::Banner).enabled);
        assert_eq!(channels.config(ChannelKind::Spoken).volume, Some(0.5));
        assert!(channels.config(ChannelKind::Visual).enabled);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels.bin");
        std::fs::write(&path, b"garbage").unwrap();

        let platform = HeadlessPlatform::new();
        let channels = NotificationChannels::with_store(
            HeadlessPlatform::backends(&platform),
            SettingsStore::new(&path),
        );
        assert_eq!(channels.settings(), ChannelSettings::default());
    }

    #[test]
    fn test_release_audio_reacquires() {
        let platform = HeadlessPlatform::new();
        let channels = NotificationChannels::new(HeadlessPlatform::backends(&platform));

        channels.test(ChannelKind::Tonal);
        assert!(channels.audio_acquired());
        channels.release_audio();
        assert!(!channels.audio_acquired());

        channels.test(ChannelKind::Tonal);
        assert_eq!(platform.count(|c| *c == PlatformCall::AudioAcquired), 2);
    }
}
