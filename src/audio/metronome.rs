//! Metronome - click patterns and tempo arithmetic
//!
//! This module holds the pure parts of the click scheduler:
//! - `ClickPattern`: which beats of a cycle sound and which rest
//! - `interval_frames`: BPM to frames between beats, truncated toward zero
//! - `ClickSettings`: the immutable tempo + pattern snapshot handed to a session
//! - `TapTempo`: tempo from the spacing of two taps

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TempoLimits;
use crate::error::AudioError;

/// What a single pattern slot plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// First beat of the cycle; plays the secondary-accent sound
    Downbeat,
    /// Any other sounding beat; plays the primary-accent sound
    Accent,
    /// Silent beat lasting as long as a click
    Rest,
}

/// Hard ceiling on either beat count, whatever the configured limits say.
pub const MAX_PATTERN_BEATS: u32 = 1024;

/// Immutable cyclic on/off sequence.
///
/// Cloning is cheap; the slots are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickPattern {
    beats: Arc<[bool]>,
}

impl ClickPattern {
    /// Builds `beats_on` sounding beats followed by `beats_off` rests.
    ///
    /// An empty pattern is representable here; `ClickSettings::new` is where
    /// it gets rejected.
    ///
    /// # Errors
    /// `PatternTooLong` when either count exceeds `MAX_PATTERN_BEATS`.
    pub fn build(beats_on: u32, beats_off: u32) -> Result<Self, AudioError> {
        let too_long = || AudioError::PatternTooLong {
            beats_on,
            beats_off,
            max_beats_on: MAX_PATTERN_BEATS,
            max_beats_off: MAX_PATTERN_BEATS,
        };
        if beats_on > MAX_PATTERN_BEATS || beats_off > MAX_PATTERN_BEATS {
            return Err(too_long());
        }
        let len = beats_on.checked_add(beats_off).ok_or_else(too_long)? as usize;
        let beats_on = beats_on as usize;
        let beats: Arc<[bool]> = (0..len).map(|i| i < beats_on).collect();
        Ok(Self { beats })
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn is_on(&self, index: usize) -> bool {
        self.beats[index]
    }

    /// Sound for the slot at `index`. Slot 0 is the downbeat only when it sounds.
    pub fn beat_at(&self, index: usize) -> Beat {
        match (self.beats[index], index) {
            (false, _) => Beat::Rest,
            (true, 0) => Beat::Downbeat,
            (true, _) => Beat::Accent,
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.beats
    }
}

/// Frames between consecutive beats at `bpm`.
///
/// Formula: ⌊60 × sample_rate / bpm⌋. The truncation is part of the cadence
/// and must not be rounded.
///
/// # Examples
/// ```
/// use practice_metronome::audio::metronome::interval_frames;
/// assert_eq!(interval_frames(120, 22050), 11025);
/// assert_eq!(interval_frames(240, 22050), 5512);
/// ```
#[inline]
pub fn interval_frames(bpm: u32, sample_rate: u32) -> usize {
    debug_assert!(bpm > 0, "interval_frames requires a positive tempo");
    (60 * sample_rate as u64 / bpm as u64) as usize
}

/// Tempo and pattern published to a running session as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickSettings {
    bpm: u32,
    beats_on: u32,
    beats_off: u32,
    pattern: ClickPattern,
}

impl ClickSettings {
    /// Validates against the default `TempoLimits`.
    pub fn new(bpm: u32, beats_on: u32, beats_off: u32) -> Result<Self, AudioError> {
        Self::within(bpm, beats_on, beats_off, &TempoLimits::default())
    }

    /// Validates inputs at the controller boundary.
    ///
    /// Only the beat counts are bounded by `limits`; any positive tempo is
    /// accepted.
    ///
    /// # Errors
    /// - `TempoInvalid` when `bpm == 0`
    /// - `PatternEmpty` when `beats_on + beats_off == 0`
    /// - `PatternTooLong` when a count exceeds `limits` or `MAX_PATTERN_BEATS`
    pub fn within(
        bpm: u32,
        beats_on: u32,
        beats_off: u32,
        limits: &TempoLimits,
    ) -> Result<Self, AudioError> {
        if bpm == 0 {
            return Err(AudioError::TempoInvalid { bpm });
        }
        if beats_on == 0 && beats_off == 0 {
            return Err(AudioError::PatternEmpty {
                beats_on,
                beats_off,
            });
        }
        if beats_on > limits.max_beats_on || beats_off > limits.max_beats_off {
            return Err(AudioError::PatternTooLong {
                beats_on,
                beats_off,
                max_beats_on: limits.max_beats_on,
                max_beats_off: limits.max_beats_off,
            });
        }
        Ok(Self {
            bpm,
            beats_on,
            beats_off,
            pattern: ClickPattern::build(beats_on, beats_off)?,
        })
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn beats_on(&self) -> u32 {
        self.beats_on
    }

    pub fn beats_off(&self) -> u32 {
        self.beats_off
    }

    pub fn pattern(&self) -> &ClickPattern {
        &self.pattern
    }
}

/// Tap-to-set tempo.
///
/// Two taps closer together than the reset window produce ⌊60 / Δs⌋ BPM,
/// clamped to the configured limits. The first tap, or one after a long
/// pause, only arms the measurement.
#[derive(Debug, Clone)]
pub struct TapTempo {
    limits: TempoLimits,
    reset_after: Duration,
    last_tap: Option<Instant>,
}

impl TapTempo {
    pub fn new(limits: TempoLimits) -> Self {
        let reset_after = Duration::from_secs_f64(limits.tap_reset_secs.max(0.0));
        Self {
            limits,
            reset_after,
            last_tap: None,
        }
    }

    pub fn tap(&mut self, now: Instant) -> Option<u32> {
        let tempo = self
            .last_tap
            .map(|last| now.saturating_duration_since(last))
            .filter(|elapsed| *elapsed < self.reset_after)
            .map(|elapsed| {
                let secs = elapsed.as_secs_f64();
                // Float-to-int casts saturate, so a zero gap lands on max_tempo.
                self.limits.clamp_tempo((60.0 / secs) as u32)
            });
        self.last_tap = Some(now);
        tempo
    }

    pub fn reset(&mut self) {
        self.last_tap = None;
    }
}
