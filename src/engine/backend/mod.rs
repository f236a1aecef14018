//! Audio sink abstractions for the click scheduler.
//!
//! A sink is a streaming PCM16 mono output with blocking writes: `write`
//! returns once the device has accepted the frames, which is what paces the
//! scheduler. Backends are factories that open a fresh sink per session on
//! the worker thread that will use it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::{AudioConfig, SAMPLE_RATE};
use crate::error::AudioError;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const DEFAULT_VOLUME: f32 = MAX_VOLUME;

/// Fixed stream format handed to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Device-side buffering, independent of the scheduler's write chunk
    pub device_buffer_frames: usize,
}

impl SinkFormat {
    pub fn from_config(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: 1,
            device_buffer_frames: audio.device_buffer_frames,
        }
    }

    /// Wall-clock length of `frames` at this format's rate.
    pub fn frames_to_duration(&self, frames: usize) -> std::time::Duration {
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// Volume scalar shared between the controller and the live sink.
///
/// Stored as `f32` bits so the device callback can read it without locking.
#[derive(Debug, Clone)]
pub struct SharedVolume {
    bits: Arc<AtomicU32>,
}

impl SharedVolume {
    pub fn new(volume: f32) -> Result<Self, AudioError> {
        Self::validate(volume)?;
        Ok(Self {
            bits: Arc::new(AtomicU32::new(volume.to_bits())),
        })
    }

    /// Rejects values outside `[MIN_VOLUME, MAX_VOLUME]`, including NaN.
    pub fn validate(volume: f32) -> Result<(), AudioError> {
        if (MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
            Ok(())
        } else {
            Err(AudioError::VolumeOutOfRange { volume })
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, volume: f32) -> Result<(), AudioError> {
        Self::validate(volume)?;
        self.bits.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Scales one PCM16 sample by the current volume.
    #[inline]
    pub fn apply(gain: f32, sample: i16) -> i16 {
        (sample as f32 * gain) as i16
    }
}

impl Default for SharedVolume {
    fn default() -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(DEFAULT_VOLUME.to_bits())),
        }
    }
}

/// Streaming audio output used by one playback session.
///
/// Sinks are created, driven and released on a single worker thread, so
/// implementations need not be `Send` (cpal streams are not on every host).
pub trait AudioSink {
    fn format(&self) -> SinkFormat;

    /// Volume cell the sink applies to every frame it outputs.
    fn volume(&self) -> &SharedVolume;

    /// Begin playback. Writes before `start` may block once the device buffer fills.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Blocks until every frame has been accepted by the device.
    ///
    /// Returns the number of frames written.
    fn write(&mut self, frames: &[i16]) -> Result<usize, AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    /// Frees the device. The sink is unusable afterwards.
    fn release(self: Box<Self>) -> Result<(), AudioError>;

    fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.volume().set(volume)
    }
}

/// Factory for platform sinks.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open_sink(
        &self,
        format: SinkFormat,
        volume: SharedVolume,
    ) -> Result<Box<dyn AudioSink>, AudioError>;
}

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalBackend;

mod desktop_stub;
pub use desktop_stub::{StubBackend, StubStats, WriteRecord};

mod wav;
pub use wav::WavSink;

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        /// Backend for the platform this build targets.
        pub fn default_backend() -> Arc<dyn AudioBackend> {
            Arc::new(OboeBackend::new())
        }
    } else {
        /// Backend for the platform this build targets.
        pub fn default_backend() -> Arc<dyn AudioBackend> {
            Arc::new(CpalBackend::new())
        }
    }
}
