// Audio module - click sounds, patterns and the write-paced scheduler

pub mod click_samples;
pub mod metronome;
pub mod scheduler;

pub use click_samples::ClickSamples;
pub use metronome::{
    interval_frames, Beat, ClickPattern, ClickSettings, TapTempo, MAX_PATTERN_BEATS,
};
pub use scheduler::{ClickScheduler, SessionSummary, Step};
