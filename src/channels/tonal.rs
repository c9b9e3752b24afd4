//! Tonal channel: procedurally synthesized sine pulses.
//!
//! No audio assets are involved. Each pulse is a sine wave shaped by a short
//! linear attack and an exponential decay; patterns are rendered to a sample
//! buffer at the device's rate and handed to the [`AudioDevice`] in one go.

use parking_lot::Mutex;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::ChannelConfig;
use super::platform::{AudioDevice, AudioDeviceFactory, AudioState, RenderedTone};
use crate::error::{PipelineError, Result};
use crate::types::{Alert, Rank};

pub const DEFAULT_TONE_VOLUME: f32 = 0.3;

const ATTACK: Duration = Duration::from_millis(10);

/// Level the decay reaches at the end of a pulse, relative to peak.
const DECAY_FLOOR: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub frequency_hz: f32,
    pub duration: Duration,
    /// Silence after this pulse.
    pub gap: Duration,
}

/// A sequence of pulses.
#[derive(Clone, Debug, PartialEq)]
pub struct TonePattern {
    pub pulses: Vec<Pulse>,
}

impl TonePattern {
    /// Severity-aware pattern: two pulses for high rank, one lower pulse otherwise.
    pub fn for_rank(rank: Rank) -> Self {
        let pulses = match rank {
            Rank::High => vec![
                Pulse {
                    frequency_hz: 880.0,
                    duration: Duration::from_millis(150),
                    gap: Duration::from_millis(100),
                },
                Pulse {
                    frequency_hz: 880.0,
                    duration: Duration::from_millis(150),
                    gap: Duration::ZERO,
                },
            ],
            Rank::Medium => vec![Pulse {
                frequency_hz: 660.0,
                duration: Duration::from_millis(200),
                gap: Duration::ZERO,
            }],
            Rank::Low => vec![Pulse {
                frequency_hz: 440.0,
                duration: Duration::from_millis(200),
                gap: Duration::ZERO,
            }],
        };
        Self { pulses }
    }

    /// Single bright chime that accompanies the new-order banner.
    pub fn order_cue() -> Self {
        Self {
            pulses: vec![Pulse {
                frequency_hz: 1046.5,
                duration: Duration::from_millis(300),
                gap: Duration::ZERO,
            }],
        }
    }

    pub fn pulse_count(&self) -> usize {
        self.pulses.len()
    }

    /// Render to mono samples in -gain..=gain.
    pub fn render(&self, sample_rate: u32, gain: f32) -> RenderedTone {
        let rate = sample_rate as f32;
        let gain = gain.clamp(0.0, 1.0);
        let mut samples = Vec::new();

        for pulse in &self.pulses {
            let len = (pulse.duration.as_secs_f32() * rate).round() as usize;
            let attack = ((ATTACK.as_secs_f32() * rate).round() as usize).min(len).max(1);
            let decay_len = len.saturating_sub(attack).max(1) as f32;

            samples.reserve(len);
            for i in 0..len {
                let envelope = if i < attack {
                    i as f32 / attack as f32
                } else {
                    DECAY_FLOOR.powf((i - attack) as f32 / decay_len)
                };
                let t = i as f32 / rate;
                samples.push(gain * envelope * (TAU * pulse.frequency_hz * t).sin());
            }

            let gap = (pulse.gap.as_secs_f32() * rate).round() as usize;
            samples.resize(samples.len() + gap, 0.0);
        }

        RenderedTone {
            sample_rate,
            samples,
            pulse_count: self.pulses.len(),
        }
    }
}

/// Shared audio output.
///
/// The device is acquired on first playback, resumed before every playback
/// if it was suspended, and dropped by [`release`](Self::release). A closed
/// device is replaced on the next playback.
pub struct AudioOutput {
    factory: Arc<dyn AudioDeviceFactory>,
    device: Mutex<Option<Box<dyn AudioDevice>>>,
}

impl AudioOutput {
    pub fn new(factory: Arc<dyn AudioDeviceFactory>) -> Self {
        Self {
            factory,
            device: Mutex::new(None),
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.device.lock().is_some()
    }

    pub fn play(&self, pattern: &TonePattern, gain: f32) -> Result<()> {
        let mut slot = self.device.lock();

        if slot
            .as_ref()
            .map_or(true, |device| device.state() == AudioState::Closed)
        {
            *slot = Some(self.factory.acquire()?);
            debug!("Audio device acquired");
        }

        let Some(device) = slot.as_mut() else {
            return Err(PipelineError::PlatformUnavailable(
                "no audio device".to_string(),
            ));
        };

        if device.state() == AudioState::Suspended {
            device.resume()?;
        }

        let tone = pattern.render(device.sample_rate(), gain);
        device.play(&tone)
    }

    /// Drop the device, if one was acquired.
    pub fn release(&self) {
        if self.device.lock().take().is_some() {
            debug!("Audio device released");
        }
    }
}

pub struct TonalChannel {
    audio: Arc<AudioOutput>,
}

impl TonalChannel {
    pub fn new(audio: Arc<AudioOutput>) -> Self {
        Self { audio }
    }

    pub fn notify(&self, alert: &Alert, config: &ChannelConfig) {
        if !config.enabled {
            return;
        }
        self.play(&TonePattern::for_rank(alert.rank), config);
    }

    /// Play the medium-rank pattern.
    pub fn test(&self, config: &ChannelConfig) {
        self.play(&TonePattern::for_rank(Rank::Medium), config);
    }

    fn play(&self, pattern: &TonePattern, config: &ChannelConfig) {
        let gain = config.volume_or(DEFAULT_TONE_VOLUME);
        if let Err(e) = self.audio.play(pattern, gain) {
            warn!(channel = "tonal", error = %e, "Tone playback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::headless::{HeadlessPlatform, PlatformCall};

    #[test]
    fn test_pulse_counts() {
        assert_eq!(TonePattern::for_rank(Rank::High).pulse_count(), 2);
        assert_eq!(TonePattern::for_rank(Rank::Medium).pulse_count(), 1);
        assert_eq!(TonePattern::for_rank(Rank::Low).pulse_count(), 1);
    }

    #[test]
    fn test_high_rank_is_higher_pitched() {
        let high = TonePattern::for_rank(Rank::High).pulses[0].frequency_hz;
        let medium = TonePattern::for_rank(Rank::Medium).pulses[0].frequency_hz;
        let low = TonePattern::for_rank(Rank::Low).pulses[0].frequency_hz;
        assert!(high > medium && medium > low);
    }

    #[test]
    fn test_render_envelope() {
        let tone = TonePattern::for_rank(Rank::High).render(8_000, 0.5);

        // 150 ms + 100 ms gap + 150 ms at 8 kHz.
        assert_eq!(tone.samples.len(), 1200 + 800 + 1200);
        assert!(tone.peak() <= 0.5);
        assert!(tone.peak() > 0.25);

        // Starts from silence and the gap is silent.
        assert_eq!(tone.samples[0], 0.0);
        assert!(tone.samples[1200..2000].iter().all(|s| *s == 0.0));

        // Tail has decayed.
        let tail = tone.samples[1150..1200]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(tail < 0.05);
    }

    #[test]
    fn test_zero_gain_is_silent() {
        let tone = TonePattern::order_cue().render(8_000, 0.0);
        assert_eq!(tone.peak(), 0.0);
        assert_eq!(tone.samples.len(), 2400);
    }

    #[test]
    fn test_lazy_acquire_and_resume() {
        let platform = HeadlessPlatform::new();
        let output = AudioOutput::new(platform.clone());
        assert!(!output.is_acquired());
        assert!(platform.calls().is_empty());

        output.play(&TonePattern::for_rank(Rank::Low), 0.3).unwrap();
        output.play(&TonePattern::for_rank(Rank::High), 0.3).unwrap();

        assert!(output.is_acquired());
        let calls = platform.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], PlatformCall::AudioAcquired);
        assert_eq!(calls[1], PlatformCall::AudioResumed);
        assert!(matches!(calls[2], PlatformCall::Tone { pulse_count: 1, .. }));
        assert!(matches!(calls[3], PlatformCall::Tone { pulse_count: 2, .. }));

        output.release();
        assert!(!output.is_acquired());
    }

    #[test]
    fn test_unavailable_device_degrades() {
        let platform = HeadlessPlatform::new();
        platform.set_audio_unavailable(true);
        let channel = TonalChannel::new(Arc::new(AudioOutput::new(platform.clone())));

        channel.test(&ChannelConfig::enabled());
        assert!(platform.tones().is_empty());

        platform.set_audio_unavailable(false);
        channel.test(&ChannelConfig::enabled());
        assert_eq!(platform.tones(), vec![1]);
    }
}
