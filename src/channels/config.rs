//! Channel configuration and its on-disk persistence.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Magic bytes for the channel settings file.
const SETTINGS_MAGIC: &[u8; 4] = b"NCS\0";

/// Current settings file format version.
const SETTINGS_VERSION: u8 = 1;

/// Header: magic + version + payload length + CRC32.
const HEADER_LEN: usize = 4 + 1 + 8 + 4;

pub const VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const RATE_RANGE: RangeInclusive<f32> = 0.1..=2.0;
pub const PITCH_RANGE: RangeInclusive<f32> = 0.0..=2.0;

/// The four delivery surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Visual,
    Spoken,
    Tonal,
    Banner,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Visual,
        ChannelKind::Spoken,
        ChannelKind::Tonal,
        ChannelKind::Banner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Visual => "visual",
            ChannelKind::Spoken => "spoken",
            ChannelKind::Tonal => "tonal",
            ChannelKind::Banner => "banner",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
}

impl ChannelConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            volume: None,
            rate: None,
            pitch: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    /// Set the volume, clamped to 0..=1.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(clamp(volume, &VOLUME_RANGE));
        self
    }

    /// Set the speech rate, clamped to 0.1..=2.
    #[must_use]
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(clamp(rate, &RATE_RANGE));
        self
    }

    /// Set the speech pitch, clamped to 0..=2.
    #[must_use]
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(clamp(pitch, &PITCH_RANGE));
        self
    }

    pub fn volume_or(&self, default: f32) -> f32 {
        self.volume.unwrap_or(default)
    }

    pub fn rate_or(&self, default: f32) -> f32 {
        self.rate.unwrap_or(default)
    }

    pub fn pitch_or(&self, default: f32) -> f32 {
        self.pitch.unwrap_or(default)
    }
}

/// Settings for all four channels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub visual: ChannelConfig,
    pub spoken: ChannelConfig,
    pub tonal: ChannelConfig,
    pub banner: ChannelConfig,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            visual: ChannelConfig::enabled(),
            spoken: ChannelConfig::enabled()
                .with_volume(0.8)
                .with_rate(1.0)
                .with_pitch(1.0),
            tonal: ChannelConfig::enabled().with_volume(0.3),
            banner: ChannelConfig::enabled().with_volume(0.3),
        }
    }
}

impl ChannelSettings {
    pub fn get(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Visual => &self.visual,
            ChannelKind::Spoken => &self.spoken,
            ChannelKind::Tonal => &self.tonal,
            ChannelKind::Banner => &self.banner,
        }
    }

    pub fn get_mut(&mut self, kind: ChannelKind) -> &mut ChannelConfig {
        match kind {
            ChannelKind::Visual => &mut self.visual,
            ChannelKind::Spoken => &mut self.spoken,
            ChannelKind::Tonal => &mut self.tonal,
            ChannelKind::Banner => &mut self.banner,
        }
    }
}

/// Persists [`ChannelSettings`] across sessions.
///
/// File layout: magic, version, payload length (u64 LE), CRC32 of the
/// payload (u32 LE), MessagePack payload.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved settings. `Ok(None)` if nothing has been saved yet.
    pub fn load(&self) -> Result<Option<ChannelSettings>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        if bytes.len() < HEADER_LEN {
            return Err(PipelineError::Corruption(format!(
                "settings file too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..4] != SETTINGS_MAGIC {
            return Err(PipelineError::Corruption(
                "invalid settings file magic".to_string(),
            ));
        }

        if bytes[4] != SETTINGS_VERSION {
            return Err(PipelineError::Corruption(format!(
                "unsupported settings version {}",
                bytes[4]
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[5..13]);
        let len = usize::try_from(u64::from_le_bytes(len_bytes)).map_err(|_| {
            PipelineError::Corruption("settings payload length out of range".to_string())
        })?;

        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[13..17]);
        let expected = u32::from_le_bytes(crc_bytes);

        let payload = HEADER_LEN
            .checked_add(len)
            .and_then(|end| bytes.get(HEADER_LEN..end))
            .ok_or_else(|| {
                PipelineError::Corruption(format!(
                    "settings payload truncated (expected {len} bytes)"
                ))
            })?;

        let got = crc32fast::hash(payload);
        if got != expected {
            return Err(PipelineError::ChecksumMismatch { expected, got });
        }

        Ok(Some(rmp_serde::from_slice(payload)?))
    }

    /// Save settings, replacing any previous file.
    pub fn save(&self, settings: &ChannelSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = rmp_serde::to_vec_named(settings)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        file.write_all(SETTINGS_MAGIC)?;
        file.write_all(&[SETTINGS_VERSION])?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        file.write_all(&payload)?;

        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_are_clamped() {
        let config = ChannelConfig::enabled()
            .with_volume(1.7)
            .with_rate(0.0)
            .with_pitch(-3.0);

        assert_eq!(config.volume, Some(1.0));
        assert_eq!(config.rate, Some(0.1));
        assert_eq!(config.pitch, Some(0.0));

        assert_eq!(ChannelConfig::enabled().with_volume(f32::NAN).volume, Some(0.0));
    }

    #[test]
    fn test_defaults_all_enabled() {
        let settings = ChannelSettings::default();
        for kind in ChannelKind::ALL {
            assert!(settings.get(kind).enabled, "{kind} should start enabled");
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("channels.bin"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("channels.bin"));

        let mut settings = ChannelSettings::default();
        settings.spoken = ChannelConfig::disabled().with_rate(1.5);
        settings.tonal.volume = Some(0.9);
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels.bin");
        let store = SettingsStore::new(&path);
        store.save(&ChannelSettings::default()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.load(),
            Err(PipelineError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_magic_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels.bin");
        fs::write(&path, b"not a settings file at all").unwrap();

        let store = SettingsStore::new(&path);
        assert!(matches!(store.load(), Err(PipelineError::Corruption(_))));
    }

    #[test]
    fn test_oversized_length_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels.bin");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(SETTINGS_MAGIC);
        bytes.push(SETTINGS_VERSION);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let store = SettingsStore::new(&path);
        assert!(matches!(store.load(), Err(PipelineError::Corruption(_))));
    }
}
