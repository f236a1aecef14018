// Public API for flutter_rust_bridge integration
// This module provides FFI functions for Flutter to drive the metronome

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use std::sync::{Arc, RwLock};

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::audio::ClickSamples;
use crate::config::MetronomeConfig;
use crate::engine::{default_backend, MetronomeController};
use crate::error::{log_audio_error, AudioError};

// Re-export error code constants for FFI exposure
pub use crate::error::AudioErrorCodes;

/// Process-wide controller shared by every FFI call.
///
/// Empty until `init_metronome` runs; calls before that fail with
/// `NotInitialized` instead of panicking.
static METRONOME: Lazy<RwLock<Option<Arc<MetronomeController>>>> =
    Lazy::new(|| RwLock::new(None));

fn controller() -> Result<Arc<MetronomeController>, AudioError> {
    let guard = METRONOME.read().map_err(|_| AudioError::LockPoisoned {
        component: "metronome".to_string(),
    })?;
    guard.as_ref().map(Arc::clone).ok_or(AudioError::NotInitialized)
}

fn install(controller: MetronomeController) -> Result<(), AudioError> {
    let previous = {
        let mut guard = METRONOME.write().map_err(|_| AudioError::LockPoisoned {
            component: "metronome".to_string(),
        })?;
        guard.replace(Arc::new(controller))
    };
    // Stop outside the lock; joining the old worker can take up to a chunk.
    if let Some(metronome) = previous {
        if let Err(err) = metronome.stop() {
            log_audio_error(&err, "replace metronome");
        }
    }
    Ok(())
}

fn logged<T>(context: &str, result: Result<T, AudioError>) -> Result<T, AudioError> {
    if let Err(err) = &result {
        log_audio_error(err, context);
    }
    result
}

/// Create the global metronome with configured or synthesized click sounds
///
/// Loads `MetronomeConfig` for the platform. Calling it again replaces the
/// existing metronome, stopping any playback.
#[flutter_rust_bridge::frb]
pub fn init_metronome() -> Result<(), AudioError> {
    crate::init_logging();
    let config = MetronomeConfig::load();
    install(MetronomeController::new(&config)?)
}

/// Create the global metronome with click sounds supplied by the host
///
/// # Arguments
/// * `primary` - Regular beat click, PCM16 mono at 22050 Hz
/// * `secondary` - Downbeat click, same length as `primary`
///
/// # Errors
/// - `SamplesInvalid` when either buffer is empty or the lengths differ
#[flutter_rust_bridge::frb]
pub fn init_metronome_with_clicks(primary: Vec<i16>, secondary: Vec<i16>) -> Result<(), AudioError> {
    crate::init_logging();
    let config = MetronomeConfig::load();
    let samples = ClickSamples::new(primary, secondary)?;
    install(MetronomeController::with_backend(
        &config,
        default_backend(),
        samples,
    )?)
}

/// Stop playback and drop the global metronome
///
/// Safe to call when nothing was initialized.
#[flutter_rust_bridge::frb]
pub fn destroy_metronome() -> Result<(), AudioError> {
    let previous = {
        let mut guard = METRONOME.write().map_err(|_| AudioError::LockPoisoned {
            component: "metronome".to_string(),
        })?;
        guard.take()
    };
    match previous {
        Some(metronome) => metronome.stop(),
        None => Ok(()),
    }
}

/// Start clicking `beats_on` beats followed by `beats_off` silent beats
///
/// Restarts playback if the metronome is already running.
///
/// # Errors
/// - `TempoInvalid` when `bpm` is 0
/// - `PatternEmpty` when both beat counts are 0
/// - `StreamOpenFailed` when the output device cannot be opened
#[flutter_rust_bridge::frb]
pub fn start_metronome(bpm: u32, beats_on: u32, beats_off: u32) -> Result<(), AudioError> {
    logged("start_metronome", controller()?.start(bpm, beats_on, beats_off))
}

/// Change tempo and pattern while playing
///
/// # Errors
/// - `NotRunning` when the metronome is stopped
/// - Same validation errors as `start_metronome`
#[flutter_rust_bridge::frb]
pub fn update_metronome(bpm: u32, beats_on: u32, beats_off: u32) -> Result<(), AudioError> {
    logged("update_metronome", controller()?.update(bpm, beats_on, beats_off))
}

/// Stop playback; a no-op when already stopped
///
/// Returns the device error if playback had ended on one.
#[flutter_rust_bridge::frb]
pub fn stop_metronome() -> Result<(), AudioError> {
    logged("stop_metronome", controller()?.stop())
}

/// Register a tap; the second of two taps less than 3 s apart sets the tempo
///
/// Returns the tapped tempo, clamped to the configured range, or `None` when
/// the tap only started a measurement. A running metronome switches to the
/// new tempo with its current pattern.
#[flutter_rust_bridge::frb]
pub fn tap_tempo() -> Result<Option<u32>, AudioError> {
    logged("tap_tempo", controller()?.tap_tempo())
}

#[flutter_rust_bridge::frb(sync)]
pub fn is_metronome_running() -> bool {
    controller().map(|m| m.is_running()).unwrap_or(false)
}

#[flutter_rust_bridge::frb(sync)]
pub fn get_tempo() -> Result<u32, AudioError> {
    Ok(controller()?.tempo())
}

#[flutter_rust_bridge::frb(sync)]
pub fn get_volume() -> Result<f32, AudioError> {
    Ok(controller()?.volume())
}

/// Set playback volume in [0.0, 1.0]; takes effect on the next buffer
#[flutter_rust_bridge::frb(sync)]
pub fn set_volume(volume: f32) -> Result<(), AudioError> {
    logged("set_volume", controller()?.set_volume(volume))
}

/// Get the version of the metronome engine
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(crate::version().to_string())
}
