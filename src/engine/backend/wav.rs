//! Offline sink that bounces the click track into a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::AudioError;

use super::{AudioSink, SharedVolume, SinkFormat};

/// Writes frames to disk as fast as they arrive; nothing paces it, so the
/// caller decides how many frames to render.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    format: SinkFormat,
    volume: SharedVolume,
    frames_written: u64,
}

impl WavSink {
    pub fn create<P: AsRef<Path>>(
        path: P,
        format: SinkFormat,
        volume: SharedVolume,
    ) -> Result<Self, AudioError> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        Ok(Self {
            writer,
            format,
            volume,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    fn start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        let gain = self.volume.get();
        for &sample in frames {
            self.writer.write_sample(SharedVolume::apply(gain, sample))?;
        }
        self.frames_written += frames.len() as u64;
        Ok(frames.len())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.writer.flush()?;
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), AudioError> {
        self.writer.finalize()?;
        Ok(())
    }
}
