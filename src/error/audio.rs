// Audio error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use std::fmt;

/// Audio error code constants exposed to Dart via FFI
///
/// The host app matches on these to decide whether to show a validation
/// message (1001-1003, 1012) or treat the metronome as failed (1005+).
///
/// Error code range: 1001-1013
#[frb(unignore)]
pub struct AudioErrorCodes {}

#[frb]
impl AudioErrorCodes {
    /// Tempo must be greater than 0
    pub const TEMPO_INVALID: i32 = 1001;

    /// beats_on + beats_off must be at least 1
    pub const PATTERN_EMPTY: i32 = 1002;

    /// Volume outside [0.0, 1.0]
    pub const VOLUME_OUT_OF_RANGE: i32 = 1003;

    /// Operation needs a running metronome
    pub const NOT_RUNNING: i32 = 1004;

    /// Click sample buffers are empty, mismatched, or unreadable
    pub const SAMPLES_INVALID: i32 = 1005;

    /// Failed to open the audio output stream
    pub const STREAM_OPEN_FAILED: i32 = 1006;

    /// Audio output failed while playing
    pub const STREAM_FAILURE: i32 = 1007;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1008;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1009;

    /// Click worker thread could not be spawned or panicked
    pub const WORKER_FAILED: i32 = 1010;

    /// FFI called before init_metronome()
    pub const NOT_INITIALIZED: i32 = 1011;

    /// Pattern has more beats than the configured limits allow
    pub const PATTERN_TOO_LONG: i32 = 1012;

    /// Configuration values contradict each other
    pub const CONFIG_INVALID: i32 = 1013;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn tempo_invalid() -> i32 {
        Self::TEMPO_INVALID
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn pattern_empty() -> i32 {
        Self::PATTERN_EMPTY
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn volume_out_of_range() -> i32 {
        Self::VOLUME_OUT_OF_RANGE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_running() -> i32 {
        Self::NOT_RUNNING
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn samples_invalid() -> i32 {
        Self::SAMPLES_INVALID
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_open_failed() -> i32 {
        Self::STREAM_OPEN_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_failure() -> i32 {
        Self::STREAM_FAILURE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn hardware_error() -> i32 {
        Self::HARDWARE_ERROR
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn worker_failed() -> i32 {
        Self::WORKER_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_initialized() -> i32 {
        Self::NOT_INITIALIZED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn pattern_too_long() -> i32 {
        Self::PATTERN_TOO_LONG
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn config_invalid() -> i32 {
        Self::CONFIG_INVALID
    }
}

/// Log an audio error with structured context
///
/// Emits one line carrying the numeric code, the originating component and
/// the human-readable message.
pub fn log_audio_error(err: &AudioError, context: &str) {
    if err.is_validation() {
        tracing::warn!(
            "Rejected input in {}: code={}, component=Metronome, message={}",
            context,
            err.code(),
            err.message()
        );
    } else {
        tracing::error!(
            "Audio error in {}: code={}, component=Metronome, message={}",
            context,
            err.code(),
            err.message()
        );
    }
}

/// Errors raised by the metronome core
///
/// Validation variants are returned synchronously from the controller
/// boundary; stream variants come from an audio sink and end the session.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Tempo must be greater than 0
    TempoInvalid { bpm: u32 },

    /// Pattern would have zero beats
    PatternEmpty { beats_on: u32, beats_off: u32 },

    /// Volume outside [0.0, 1.0]
    VolumeOutOfRange { volume: f32 },

    /// Operation needs a running metronome
    NotRunning,

    /// Click sample buffers are empty, mismatched, or unreadable
    SamplesInvalid { reason: String },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Audio stream failed while playing
    StreamFailure { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Click worker could not be spawned or panicked
    WorkerFailed { reason: String },

    /// FFI surface used before initialization
    NotInitialized,

    /// beats_on or beats_off above its limit
    PatternTooLong {
        beats_on: u32,
        beats_off: u32,
        max_beats_on: u32,
        max_beats_off: u32,
    },

    /// Configuration rejected at controller construction
    ConfigInvalid { reason: String },
}

impl AudioError {
    /// True for errors produced by input validation rather than by the device.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AudioError::TempoInvalid { .. }
                | AudioError::PatternEmpty { .. }
                | AudioError::VolumeOutOfRange { .. }
                | AudioError::PatternTooLong { .. }
        )
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::TempoInvalid { .. } => AudioErrorCodes::TEMPO_INVALID,
            AudioError::PatternEmpty { .. } => AudioErrorCodes::PATTERN_EMPTY,
            AudioError::VolumeOutOfRange { .. } => AudioErrorCodes::VOLUME_OUT_OF_RANGE,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::SamplesInvalid { .. } => AudioErrorCodes::SAMPLES_INVALID,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::WorkerFailed { .. } => AudioErrorCodes::WORKER_FAILED,
            AudioError::NotInitialized => AudioErrorCodes::NOT_INITIALIZED,
            AudioError::PatternTooLong { .. } => AudioErrorCodes::PATTERN_TOO_LONG,
            AudioError::ConfigInvalid { .. } => AudioErrorCodes::CONFIG_INVALID,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::TempoInvalid { bpm } => {
                format!("Tempo must be greater than 0 (got {})", bpm)
            }
            AudioError::PatternEmpty {
                beats_on,
                beats_off,
            } => format!(
                "Pattern needs at least one beat (beats_on={}, beats_off={})",
                beats_on, beats_off
            ),
            AudioError::VolumeOutOfRange { volume } => {
                format!("Volume outside of valid range [0, 1] (got {})", volume)
            }
            AudioError::NotRunning => {
                "Metronome not running. Call start() first.".to_string()
            }
            AudioError::SamplesInvalid { reason } => {
                format!("Invalid click samples: {}", reason)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::WorkerFailed { reason } => {
                format!("Click worker failed: {}", reason)
            }
            AudioError::NotInitialized => {
                "Metronome not initialized. Call init_metronome() first.".to_string()
            }
            AudioError::PatternTooLong {
                beats_on,
                beats_off,
                max_beats_on,
                max_beats_off,
            } => format!(
                "Pattern too long (beats_on={} of max {}, beats_off={} of max {})",
                beats_on, max_beats_on, beats_off, max_beats_off
            ),
            AudioError::ConfigInvalid { reason } => {
                format!("Invalid configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => io.into(),
            other => AudioError::SamplesInvalid {
                reason: other.to_string(),
            },
        }
    }
}
