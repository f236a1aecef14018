//! Oboe-based sink for Android.
//!
//! Oboe's synchronous output stream already has blocking-write semantics, so
//! frames go straight to the device after the software gain is applied.

use ::oboe::{
    AudioOutputStreamSync, AudioStream, AudioStreamBuilder, AudioStreamSync, Mono, Output,
    PerformanceMode, SharingMode, Usage,
};

use crate::config::WRITE_CHUNK_FRAMES;
use crate::error::AudioError;

use super::{AudioBackend, AudioSink, SharedVolume, SinkFormat};

/// Upper bound for one blocking write; generous against the write chunk.
const WRITE_TIMEOUT_NANOS: i64 = 2_000_000_000;

/// Android backend that opens Oboe output streams.
#[derive(Default)]
pub struct OboeBackend {
    _unit: (),
}

impl OboeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for OboeBackend {
    fn name(&self) -> &'static str {
        "oboe"
    }

    fn open_sink(
        &self,
        format: SinkFormat,
        volume: SharedVolume,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(Box::new(OboeSink::open(format, volume)?))
    }
}

pub struct OboeSink {
    stream: AudioStreamSync<Output, (i16, Mono)>,
    format: SinkFormat,
    volume: SharedVolume,
    /// Gain-scaled copy of the frames being written, allocated once
    scratch: Vec<i16>,
}

impl OboeSink {
    pub fn open(format: SinkFormat, volume: SharedVolume) -> Result<Self, AudioError> {
        let stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::None)
            .set_sharing_mode(SharingMode::Shared)
            .set_usage(Usage::Media)
            .set_direction::<Output>()
            .set_sample_rate(format.sample_rate as i32)
            .set_channel_count::<Mono>()
            .set_format::<i16>()
            .set_buffer_capacity_in_frames(format.device_buffer_frames as i32)
            .open_stream()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Output stream: {:?}", e),
            })?;

        tracing::info!(
            "[OboeSink] Opened output stream at {} Hz, {} frame buffer",
            format.sample_rate,
            format.device_buffer_frames
        );

        Ok(Self {
            stream,
            format,
            volume,
            scratch: Vec::with_capacity(WRITE_CHUNK_FRAMES),
        })
    }
}

impl AudioSink for OboeSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start output stream: {:?}", e),
        })
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        let gain = self.volume.get();
        self.scratch.clear();
        self.scratch
            .extend(frames.iter().map(|&s| SharedVolume::apply(gain, s)));

        let mut written = 0;
        while written < self.scratch.len() {
            let n = self
                .stream
                .write(&self.scratch[written..], WRITE_TIMEOUT_NANOS)
                .map_err(|e| AudioError::StreamFailure {
                    reason: format!("Oboe write failed: {:?}", e),
                })?;
            if n <= 0 {
                return Err(AudioError::StreamFailure {
                    reason: "Oboe write timed out".to_string(),
                });
            }
            written += n as usize;
        }
        Ok(written)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream.stop().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to stop output stream: {:?}", e),
        })
    }

    fn release(mut self: Box<Self>) -> Result<(), AudioError> {
        let result = self.stream.close().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to close output stream: {:?}", e),
        });
        drop(self);
        result
    }
}
