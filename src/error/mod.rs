// Error types for the practice metronome core
//
// One error enum covers the controller, the click scheduler and the sinks.
// Every variant carries a stable numeric code for the Dart side.

mod audio;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};

/// Stable code plus human-readable text, as reported across FFI.
pub trait ErrorCode {
    /// Numeric code from `AudioErrorCodes`
    fn code(&self) -> i32;

    fn message(&self) -> String;
}
