use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::AudioError;

use super::{AudioBackend, AudioSink, SharedVolume, SinkFormat};

/// One `write` as seen by a stub sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    /// Frames written by this sink before this write
    pub offset: u64,
    pub frames: usize,
    /// Largest absolute sample value, after volume
    pub peak: i16,
}

impl WriteRecord {
    pub fn is_silent(&self) -> bool {
        self.peak == 0
    }
}

/// Counters shared by every sink a `StubBackend` opens.
#[derive(Debug, Clone, Default)]
pub struct StubStats {
    pub opened: usize,
    pub released: usize,
    /// Sinks currently open
    pub live: usize,
    /// Highest `live` ever observed
    pub max_live: usize,
    /// Writes of the most recently opened sink
    pub writes: Vec<WriteRecord>,
    pub total_frames: u64,
}

/// Desktop stub backend used for deterministic testing and CLI dry runs.
///
/// Sinks record what they were asked to play instead of touching hardware.
/// With pacing enabled each write sleeps for the audio time it represents,
/// divided by `speed`, which stands in for the device draining its buffer.
#[derive(Clone)]
pub struct StubBackend {
    stats: Arc<Mutex<StubStats>>,
    speed: Option<f64>,
    fail_open: bool,
    fail_after_writes: Option<usize>,
}

impl StubBackend {
    /// Unpaced: writes return immediately.
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(StubStats::default())),
            speed: None,
            fail_open: false,
            fail_after_writes: None,
        }
    }

    /// Writes take `frames / sample_rate / speed` seconds.
    pub fn paced(mut self, speed: f64) -> Self {
        self.speed = Some(speed.max(f64::MIN_POSITIVE));
        self
    }

    /// Every `open_sink` fails with `StreamOpenFailed`.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Each sink fails with `StreamFailure` on write number `writes + 1`.
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after_writes = Some(writes);
        self
    }

    /// Snapshot of the shared counters.
    pub fn stats(&self) -> StubStats {
        lock_stats(&self.stats).clone()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open_sink(
        &self,
        format: SinkFormat,
        volume: SharedVolume,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        if self.fail_open {
            return Err(AudioError::StreamOpenFailed {
                reason: "stub backend configured to fail".to_string(),
            });
        }

        {
            let mut stats = lock_stats(&self.stats);
            stats.opened += 1;
            stats.live += 1;
            stats.max_live = stats.max_live.max(stats.live);
            stats.writes.clear();
        }

        Ok(Box::new(StubSink {
            stats: Arc::clone(&self.stats),
            format,
            volume,
            speed: self.speed,
            fail_after_writes: self.fail_after_writes,
            writes: 0,
            offset: 0,
        }))
    }
}

struct StubSink {
    stats: Arc<Mutex<StubStats>>,
    format: SinkFormat,
    volume: SharedVolume,
    speed: Option<f64>,
    fail_after_writes: Option<usize>,
    writes: usize,
    offset: u64,
}

impl AudioSink for StubSink {
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
        if self
            .fail_after_writes
            .is_some_and(|limit| self.writes >= limit)
        {
            return Err(AudioError::StreamFailure {
                reason: "stub sink configured to fail".to_string(),
            });
        }

        let gain = self.volume.get();
        let peak = frames
            .iter()
            .map(|&s| SharedVolume::apply(gain, s).saturating_abs())
            .max()
            .unwrap_or(0);

        {
            let mut stats = lock_stats(&self.stats);
            stats.writes.push(WriteRecord {
                offset: self.offset,
                frames: frames.len(),
                peak,
            });
            stats.total_frames += frames.len() as u64;
        }

        self.writes += 1;
        self.offset += frames.len() as u64;

        if let Some(speed) = self.speed {
            let audio_time = self.format.frames_to_duration(frames.len());
            thread::sleep(Duration::from_secs_f64(audio_time.as_secs_f64() / speed));
        }

        Ok(frames.len())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), AudioError> {
        let mut stats = lock_stats(&self.stats);
        stats.released += 1;
        stats.live = stats.live.saturating_sub(1);
        Ok(())
    }
}

fn lock_stats(stats: &Mutex<StubStats>) -> MutexGuard<'_, StubStats> {
    // Counters stay meaningful even if a test thread panicked mid-update.
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
