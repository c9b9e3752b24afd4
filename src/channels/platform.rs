//! Platform primitives behind the notification channels.
//!
//! Every method returns a [`Result`]; a failure means the primitive is not
//! available right now and the channel degrades to a no-op for that call.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient on-screen message.
#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub duration: Duration,
}

pub trait ToastSurface: Send + Sync {
    fn show(&self, toast: &Toast) -> Result<()>;
}

/// One sentence for the speech engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Speech synthesis. `speak` queues behind anything already speaking;
/// `cancel` drops the current utterance and the queue.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, utterance: &Utterance) -> Result<()>;
    fn cancel(&self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioState {
    Running,
    /// Created but not yet allowed to produce sound.
    Suspended,
    Closed,
}

/// A rendered tone pattern ready for playback.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedTone {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub pulse_count: usize,
}

impl RenderedTone {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// An open audio output.
pub trait AudioDevice: Send {
    fn sample_rate(&self) -> u32;
    fn state(&self) -> AudioState;
    fn resume(&mut self) -> Result<()>;
    fn play(&mut self, tone: &RenderedTone) -> Result<()>;
}

/// Opens audio devices on demand.
pub trait AudioDeviceFactory: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn AudioDevice>>;
}

/// Contents of the new-order banner.
#[derive(Clone, Debug, PartialEq)]
pub struct BannerContent {
    pub order_number: String,
    pub customer: String,
    pub total: Option<f64>,
    pub item_count: usize,
}

impl BannerContent {
    pub fn title(&self) -> String {
        format!("New order #{}", self.order_number)
    }
}

pub trait BannerSurface: Send + Sync {
    fn show(&self, content: &BannerContent) -> Result<()>;
    fn hide(&self) -> Result<()>;
}

/// The set of primitives a [`NotificationChannels`](super::NotificationChannels)
/// is built on.
#[derive(Clone)]
pub struct PlatformBackends {
    pub toasts: Arc<dyn ToastSurface>,
    pub speech: Arc<dyn SpeechEngine>,
    pub audio: Arc<dyn AudioDeviceFactory>,
    pub banner: Arc<dyn BannerSurface>,
}
