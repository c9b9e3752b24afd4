//! Banner channel: the auto-dismissing new-order overlay.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::ChannelConfig;
use super::platform::{BannerContent, BannerSurface};
use super::tonal::{AudioOutput, TonePattern, DEFAULT_TONE_VOLUME};

/// How long a banner stays up unless closed.
pub const BANNER_DURATION: Duration = Duration::from_secs(8);

struct ActiveBanner {
    content: BannerContent,
    token: u64,
    timer: JoinHandle<()>,
}

/// At most one banner is shown at a time; a show request while one is up
/// is ignored rather than queued or restarted.
///
/// Showing arms a Tokio timer, so [`show`](Self::show) must run inside a
/// runtime.
pub struct BannerChannel {
    surface: Arc<dyn BannerSurface>,
    audio: Arc<AudioOutput>,
    active: Mutex<Option<ActiveBanner>>,
    next_token: AtomicU64,
    this: Weak<Self>,
}

impl BannerChannel {
    pub fn new(surface: Arc<dyn BannerSurface>, audio: Arc<AudioOutput>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            surface,
            audio,
            active: Mutex::new(None),
            next_token: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    pub fn is_showing(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn current(&self) -> Option<BannerContent> {
        self.active.lock().as_ref().map(|a| a.content.clone())
    }

    /// Show `content` and play the order cue. Returns false if disabled,
    /// already showing, or the surface failed.
    pub fn show(&self, content: BannerContent, config: &ChannelConfig) -> bool {
        if !config.enabled {
            return false;
        }

        {
            let mut active = self.active.lock();
            if active.is_some() {
                debug!(order = %content.order_number, "Banner already showing, ignoring");
                return false;
            }

            if let Err(e) = self.surface.show(&content) {
                warn!(channel = "banner", error = %e, "Banner failed");
                return false;
            }

            let token = self.next_token.fetch_add(1, Ordering::SeqCst);
            let this = self.this.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(BANNER_DURATION).await;
                if let Some(banner) = this.upgrade() {
                    banner.on_timeout(token);
                }
            });

            debug!(order = %content.order_number, "Banner shown");
            *active = Some(ActiveBanner {
                content,
                token,
                timer,
            });
        }

        let gain = config.volume_or(DEFAULT_TONE_VOLUME);
        if let Err(e) = self.audio.play(&TonePattern::order_cue(), gain) {
            warn!(channel = "banner", error = %e, "Order cue failed");
        }
        true
    }

    /// Dismiss the banner early. Returns false if none was showing.
    pub fn close(&self) -> bool {
        let Some(active) = self.active.lock().take() else {
            return false;
        };
        active.timer.abort();
        self.hide();
        true
    }

    /// Show a sample banner.
    pub fn test(&self, config: &ChannelConfig) -> bool {
        let sample = BannerContent {
            order_number: "1001".to_string(),
            customer: "Test Customer".to_string(),
            total: Some(49.99),
            item_count: 2,
        };
        self.show(sample, &ChannelConfig { enabled: true, ..*config })
    }

    fn on_timeout(&self, token: u64) {
        {
            let mut active = self.active.lock();
            match active.as_ref() {
                Some(current) if current.token == token => {
                    // The timer is the running task; detach its handle.
                    *active = None;
                }
                _ => return,
            }
        }
        debug!("Banner auto-closed");
        self.hide();
    }

    fn hide(&self) {
        if let Err(e) = self.surface.hide() {
            warn!(channel = "banner", error = %e, "Failed to hide banner");
        }
    }
}

impl Drop for BannerChannel {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.timer.abort();
        }
    }
}
