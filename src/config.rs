//! Configuration management for the metronome core
//!
//! Runtime configuration is loaded from a JSON file so device buffering,
//! default playback settings and click sounds can be adjusted without
//! recompiling. Every field falls back to its default, so partial files work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{ClickSettings, MAX_PATTERN_BEATS};
use crate::engine::backend::SharedVolume;
use crate::error::AudioError;

/// Output sample rate in Hz. Fixed for every sink.
pub const SAMPLE_RATE: u32 = 22050;

/// Silence is written in chunks of at most this many frames between clicks.
pub const WRITE_CHUNK_FRAMES: usize = 8820;

/// Device-side buffer: 22050 bytes of mono PCM16.
pub const DEVICE_BUFFER_FRAMES: usize = 11025;

/// Complete metronome configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetronomeConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub defaults: PlaybackDefaults,
    #[serde(default)]
    pub limits: TempoLimits,
    #[serde(default)]
    pub clicks: ClickSourceConfig,
}

/// Audio sink buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames the output device buffers ahead of playback
    pub device_buffer_frames: usize,
    /// Upper bound on a single silence write; bounds stop latency
    pub write_chunk_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_buffer_frames: DEVICE_BUFFER_FRAMES,
            write_chunk_frames: WRITE_CHUNK_FRAMES,
        }
    }
}

/// Initial tempo, pattern and volume for a fresh controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    pub tempo: u32,
    pub beats_on: u32,
    pub beats_off: u32,
    pub volume: f32,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            tempo: 120,
            beats_on: 1,
            beats_off: 0,
            volume: 1.0,
        }
    }
}

/// Ranges for tempo and pattern length
///
/// The controller rejects patterns longer than `max_beats_on` /
/// `max_beats_off`. The tempo range bounds tap tempo; explicit tempos only
/// need to be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoLimits {
    pub min_tempo: u32,
    pub max_tempo: u32,
    pub max_beats_on: u32,
    pub max_beats_off: u32,
    /// Taps further apart than this start a new measurement
    pub tap_reset_secs: f64,
}

impl Default for TempoLimits {
    fn default() -> Self {
        Self {
            min_tempo: 20,
            max_tempo: 400,
            max_beats_on: 32,
            max_beats_off: 32,
            tap_reset_secs: 3.0,
        }
    }
}

impl TempoLimits {
    /// Never panics, even on limits that failed `validate`.
    pub fn clamp_tempo(&self, bpm: u32) -> u32 {
        bpm.max(self.min_tempo).min(self.max_tempo)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_tempo == 0 || self.min_tempo > self.max_tempo {
            return Err(format!(
                "tempo range {}..={} is empty or includes 0",
                self.min_tempo, self.max_tempo
            ));
        }
        if !(1..=MAX_PATTERN_BEATS).contains(&self.max_beats_on) {
            return Err(format!(
                "max_beats_on {} outside 1..={}",
                self.max_beats_on, MAX_PATTERN_BEATS
            ));
        }
        if self.max_beats_off > MAX_PATTERN_BEATS {
            return Err(format!(
                "max_beats_off {} above {}",
                self.max_beats_off, MAX_PATTERN_BEATS
            ));
        }
        if !self.tap_reset_secs.is_finite() || self.tap_reset_secs < 0.0 {
            return Err(format!("tap_reset_secs {} is not a duration", self.tap_reset_secs));
        }
        Ok(())
    }
}

/// Optional WAV files replacing the built-in click sounds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickSourceConfig {
    /// Sound for accented beats after the downbeat
    pub primary_wav: Option<PathBuf>,
    /// Sound for the downbeat
    pub secondary_wav: Option<PathBuf>,
}

impl MetronomeConfig {
    /// Checks that the limits are coherent and the defaults fit inside them.
    ///
    /// # Errors
    /// - `ConfigInvalid` for bad limits or zero-sized buffers
    /// - The validation error of the offending default setting
    pub fn validate(&self) -> Result<(), AudioError> {
        self.limits
            .validate()
            .map_err(|reason| AudioError::ConfigInvalid { reason })?;
        if self.audio.write_chunk_frames == 0 || self.audio.device_buffer_frames == 0 {
            return Err(AudioError::ConfigInvalid {
                reason: "audio buffer sizes must be positive".to_string(),
            });
        }
        let defaults = &self.defaults;
        ClickSettings::within(
            defaults.tempo,
            defaults.beats_on,
            defaults.beats_off,
            &self.limits,
        )?;
        SharedVolume::validate(defaults.volume)
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing, invalid
    /// or fails `validate`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                        config
                    }
                    Err(err) => {
                        log::warn!(
                            "[Config] Rejected configuration in {:?}: {}. Using defaults.",
                            path.as_ref(),
                            err
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Android builds ship without a config file.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Using default configuration");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/metronome_config.json")
    }
}
