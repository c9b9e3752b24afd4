//! Notification channels.
//!
//! An ingested alert fans out to three severity-aware channels:
//!
//! - [`VisualChannel`]: a toast whose lifetime grows with rank
//! - [`SpokenChannel`]: a sentence through the speech engine; high rank
//!   interrupts
//! - [`TonalChannel`]: synthesized pulses, two for high rank
//!
//! The fourth, [`BannerChannel`], is only raised for new orders.
//! [`NotificationChannels`] owns all four plus their persisted settings.
//! Platform primitives are traits (see [`platform`]); [`HeadlessPlatform`]
//! records calls instead of producing output.

mod banner;
mod config;
pub mod headless;
mod notifier;
pub mod platform;
mod spoken;
mod tonal;
mod visual;

pub use banner::{BannerChannel, BANNER_DURATION};
pub use config::{ChannelConfig, ChannelKind, ChannelSettings, SettingsStore};
pub use headless::{HeadlessPlatform, PlatformCall};
pub use notifier::NotificationChannels;
pub use platform::{
    AudioDevice, AudioDeviceFactory, AudioState, BannerContent, BannerSurface, PlatformBackends,
    RenderedTone, SpeechEngine, Toast, ToastLevel, ToastSurface, Utterance,
};
pub use spoken::SpokenChannel;
pub use tonal::{AudioOutput, Pulse, TonalChannel, TonePattern};
pub use visual::{VisualChannel, ERROR_TOAST_DURATION, MESSAGE_TOAST_DURATION};
