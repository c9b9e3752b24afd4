//! Headless platform: records every call instead of producing output.
//!
//! Used by tests and by the `alert-monitor` binary, which runs without a
//! display or sound card.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use super::platform::{
    AudioDevice, AudioDeviceFactory, AudioState, BannerContent, BannerSurface, PlatformBackends,
    RenderedTone, SpeechEngine, Toast, ToastSurface, Utterance,
};
use crate::error::{PipelineError, Result};

const HEADLESS_SAMPLE_RATE: u32 = 8_000;

/// One recorded platform call.
#[derive(Clone, Debug, PartialEq)]
pub enum PlatformCall {
    Toast(Toast),
    Speak(Utterance),
    CancelSpeech,
    AudioAcquired,
    AudioResumed,
    Tone { pulse_count: usize, peak: f32 },
    BannerShown(BannerContent),
    BannerHidden,
}

/// Recording implementation of every platform trait.
#[derive(Default)]
pub struct HeadlessPlatform {
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    speech_unavailable: AtomicBool,
    audio_unavailable: AtomicBool,
    echo: bool,
}

impl HeadlessPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Like [`new`](Self::new), but also logs every call at `info`.
    pub fn echoing() -> Arc<Self> {
        Arc::new(Self {
            echo: true,
            ..Self::default()
        })
    }

    /// Backends that all point at `platform`.
    pub fn backends(platform: &Arc<Self>) -> PlatformBackends {
        PlatformBackends {
            toasts: platform.clone(),
            speech: platform.clone(),
            audio: platform.clone(),
            banner: platform.clone(),
        }
    }

    /// Make the speech engine fail until re-enabled.
    pub fn set_speech_unavailable(&self, unavailable: bool) {
        self.speech_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make audio device acquisition fail until re-enabled.
    pub fn set_audio_unavailable(&self, unavailable: bool) {
        self.audio_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Toast(toast) => Some(toast.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Speak(utterance) => Some(utterance.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pulse counts of every tone played, in order.
    pub fn tones(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Tone { pulse_count, .. } => Some(*pulse_count),
                _ => None,
            })
            .collect()
    }

    pub fn banners_shown(&self) -> Vec<BannerContent> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::BannerShown(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: PlatformCall) {
        if self.echo {
            info!(call = ?call, "Headless output");
        }
        record(&self.calls, call);
    }
}

fn record(calls: &Mutex<Vec<PlatformCall>>, call: PlatformCall) {
    calls.lock().push(call);
}

impl ToastSurface for HeadlessPlatform {
    fn show(&self, toast: &Toast) -> Result<()> {
        self.record(PlatformCall::Toast(toast.clone()));
        Ok(())
    }
}

impl SpeechEngine for HeadlessPlatform {
    fn speak(&self, utterance: &Utterance) -> Result<()> {
        if self.speech_unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::PlatformUnavailable(
                "speech engine unavailable".to_string(),
            ));
        }
        self.record(PlatformCall::Speak(utterance.clone()));
        Ok(())
    }

    fn cancel(&self) -> Result<()> {
        if self.speech_unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::PlatformUnavailable(
                "speech engine unavailable".to_string(),
            ));
        }
        self.record(PlatformCall::CancelSpeech);
        Ok(())
    }
}

impl BannerSurface for HeadlessPlatform {
    fn show(&self, content: &BannerContent) -> Result<()> {
        self.record(PlatformCall::BannerShown(content.clone()));
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.record(PlatformCall::BannerHidden);
        Ok(())
    }
}

impl AudioDeviceFactory for HeadlessPlatform {
    fn acquire(&self) -> Result<Box<dyn AudioDevice>> {
        if self.audio_unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::PlatformUnavailable(
                "no audio output".to_string(),
            ));
        }
        self.record(PlatformCall::AudioAcquired);
        // Devices start suspended, like a browser audio context before
        // the first user gesture.
        Ok(Box::new(HeadlessAudioDevice {
            calls: Arc::clone(&self.calls),
            state: AudioState::Suspended,
        }))
    }
}

struct HeadlessAudioDevice {
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    state: AudioState,
}

impl AudioDevice for HeadlessAudioDevice {
    fn sample_rate(&self) -> u32 {
        HEADLESS_SAMPLE_RATE
    }

    fn state(&self) -> AudioState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        self.state = AudioState::Running;
        record(&self.calls, PlatformCall::AudioResumed);
        Ok(())
    }

    fn play(&mut self, tone: &RenderedTone) -> Result<()> {
        if self.state != AudioState::Running {
            return Err(PipelineError::PlatformUnavailable(format!(
                "audio device is {:?}",
                self.state
            )));
        }
        record(
            &self.calls,
            PlatformCall::Tone {
                pulse_count: tone.pulse_count,
                peak: tone.peak(),
            },
        );
        Ok(())
    }
}
