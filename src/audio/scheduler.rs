//! ClickScheduler - paces clicks with blocking sink writes
//!
//! The loop never sleeps. Between clicks it writes silence in chunks of at
//! most `write_chunk_frames`, and the sink's blocking `write` returns only
//! once the device has taken those frames. Timing therefore follows the
//! audio clock; resolution is bounded by the chunk size.
//!
//! Per iteration:
//! 1. interval = ⌊60 × rate / bpm⌋ from the latest settings
//! 2. frames_since_played ≥ interval → write the next pattern slot, then
//!    frames_since_played = click length (the frames that write consumed)
//! 3. otherwise write min(interval − frames_since_played, chunk) of silence

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::click_samples::ClickSamples;
use super::metronome::{interval_frames, Beat, ClickSettings};
use crate::config::AudioConfig;
use crate::engine::backend::AudioSink;
use crate::error::AudioError;

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A pattern slot was written
    Beat(Beat),
    /// This many frames of silence were written while waiting
    Wait(usize),
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub beats: u64,
    pub frames_written: u64,
}

pub struct ClickScheduler {
    samples: Arc<ClickSamples>,
    settings: ClickSettings,
    updates: Option<watch::Receiver<ClickSettings>>,
    sample_rate: u32,
    write_chunk_frames: usize,
    /// Zeros reused for rests and waits; sized for the larger of the two
    silence: Vec<i16>,
    pattern_index: usize,
    frames_since_played: usize,
    summary: SessionSummary,
}

impl ClickScheduler {
    pub fn new(
        samples: Arc<ClickSamples>,
        settings: ClickSettings,
        sample_rate: u32,
        audio: &AudioConfig,
    ) -> Self {
        let write_chunk_frames = audio.write_chunk_frames.max(1);
        let silence = vec![0; samples.frames().max(write_chunk_frames)];
        // Start "one interval late" so the first iteration clicks immediately.
        let frames_since_played = interval_frames(settings.bpm(), sample_rate);

        Self {
            samples,
            settings,
            updates: None,
            sample_rate,
            write_chunk_frames,
            silence,
            pattern_index: 0,
            frames_since_played,
            summary: SessionSummary::default(),
        }
    }

    /// Settings published on `updates` replace the current ones at the start
    /// of the next iteration.
    pub fn with_updates(mut self, updates: watch::Receiver<ClickSettings>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn settings(&self) -> &ClickSettings {
        &self.settings
    }

    pub fn pattern_index(&self) -> usize {
        self.pattern_index
    }

    pub fn frames_since_played(&self) -> usize {
        self.frames_since_played
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Current interval in frames, recomputed from the live tempo.
    pub fn interval(&self) -> usize {
        interval_frames(self.settings.bpm(), self.sample_rate)
    }

    /// Runs one scheduling decision and performs its write.
    pub fn step(&mut self, sink: &mut dyn AudioSink) -> Result<Step, AudioError> {
        self.poll_updates();

        let interval = self.interval();
        if self.frames_since_played >= interval {
            let beat = self.settings.pattern().beat_at(self.pattern_index);
            let click_frames = self.samples.frames();
            let frames = match beat {
                Beat::Downbeat => self.samples.secondary(),
                Beat::Accent => self.samples.primary(),
                Beat::Rest => &self.silence[..click_frames],
            };
            sink.write(frames)?;

            self.pattern_index = (self.pattern_index + 1) % self.settings.pattern().len();
            self.frames_since_played = click_frames;
            self.summary.beats += 1;
            self.summary.frames_written += click_frames as u64;
            Ok(Step::Beat(beat))
        } else {
            let remaining = interval - self.frames_since_played;
            let rest = remaining.min(self.write_chunk_frames);
            sink.write(&self.silence[..rest])?;

            self.frames_since_played += rest;
            self.summary.frames_written += rest as u64;
            Ok(Step::Wait(rest))
        }
    }

    /// Plays until `cancel` is set or the sink fails.
    ///
    /// The sink is stopped and released on every exit path. Cancellation is
    /// checked between writes, so it takes effect after the in-flight write.
    pub fn run(
        mut self,
        mut sink: Box<dyn AudioSink>,
        cancel: &AtomicBool,
    ) -> Result<SessionSummary, AudioError> {
        tracing::info!(
            "[ClickScheduler] Starting loop: bpm={}, pattern={:?}, interval={} frames",
            self.settings.bpm(),
            self.settings.pattern().as_slice(),
            self.interval()
        );

        let played = sink.start().and_then(|()| {
            while !cancel.load(Ordering::Acquire) {
                self.step(sink.as_mut())?;
            }
            Ok(())
        });

        let stopped = sink.stop();
        let released = sink.release();

        played.and(stopped).and(released)?;

        tracing::info!(
            "[ClickScheduler] Loop finished: {} beats, {} frames",
            self.summary.beats,
            self.summary.frames_written
        );
        Ok(self.summary)
    }

    fn poll_updates(&mut self) {
        let Some(updates) = self.updates.as_mut() else {
            return;
        };
        // Err means the controller dropped the sender; keep the last settings.
        if !updates.has_changed().unwrap_or(false) {
            return;
        }

        let settings = updates.borrow_and_update().clone();
        tracing::debug!(
            "[ClickScheduler] Applying update: bpm={}, pattern={:?}",
            settings.bpm(),
            settings.pattern().as_slice()
        );
        self.settings = settings;
        self.pattern_index = 0;
    }
}
