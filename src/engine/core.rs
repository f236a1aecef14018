//! MetronomeController: the control surface shared by the FFI layer and CLI.
//!
//! Owns at most one `PlaybackSession`. Every operation that replaces or ends
//! a session runs under the state lock and joins the old worker before
//! returning, so two sinks are never open at once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::audio::{ClickSamples, ClickSettings, SessionSummary, TapTempo};
use crate::config::{AudioConfig, MetronomeConfig, TempoLimits};
use crate::engine::backend::{self, AudioBackend, SharedVolume};
use crate::engine::events::{EventPublisher, MetronomeEvent, MetronomeEventKind};
use crate::engine::session::PlaybackSession;
use crate::error::{log_audio_error, AudioError};

struct ControllerState {
    session: Option<PlaybackSession>,
    /// Last accepted settings; survives `stop` so `tempo()` keeps answering
    settings: ClickSettings,
}

pub struct MetronomeController {
    backend: Arc<dyn AudioBackend>,
    samples: Arc<ClickSamples>,
    audio: AudioConfig,
    limits: TempoLimits,
    volume: SharedVolume,
    events: EventPublisher,
    tap: Mutex<TapTempo>,
    state: Mutex<ControllerState>,
}

impl MetronomeController {
    /// Controller on the platform backend, with click sounds from
    /// `config.clicks` (synthesized when no files are configured).
    pub fn new(config: &MetronomeConfig) -> Result<Self, AudioError> {
        let samples = ClickSamples::from_config(&config.clicks)?;
        Self::with_backend(config, backend::default_backend(), samples)
    }

    /// # Errors
    /// Whatever `MetronomeConfig::validate` rejects.
    pub fn with_backend(
        config: &MetronomeConfig,
        backend: Arc<dyn AudioBackend>,
        samples: ClickSamples,
    ) -> Result<Self, AudioError> {
        config.validate()?;
        let defaults = &config.defaults;
        let settings = ClickSettings::within(
            defaults.tempo,
            defaults.beats_on,
            defaults.beats_off,
            &config.limits,
        )?;
        let volume = SharedVolume::new(defaults.volume)?;

        tracing::info!(
            "[Controller] Created on {} backend: {} frame clicks, volume {}",
            backend.name(),
            samples.frames(),
            defaults.volume
        );

        Ok(Self {
            backend,
            samples: Arc::new(samples),
            audio: config.audio.clone(),
            limits: config.limits.clone(),
            volume,
            events: EventPublisher::new(),
            tap: Mutex::new(TapTempo::new(config.limits.clone())),
            state: Mutex::new(ControllerState {
                session: None,
                settings,
            }),
        })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>, AudioError> {
        self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "controller_state".to_string(),
        })
    }

    /// Read-only access; the state stays consistent even if a holder panicked.
    fn peek_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts clicking `beats_on` beats then `beats_off` rests at `bpm`.
    ///
    /// A running session is stopped and joined first. Returns once the new
    /// sink is open.
    ///
    /// # Errors
    /// - `TempoInvalid` / `PatternEmpty` / `PatternTooLong` for bad input;
    ///   nothing changes
    /// - Any sink open error from the backend
    pub fn start(&self, bpm: u32, beats_on: u32, beats_off: u32) -> Result<(), AudioError> {
        let settings = ClickSettings::within(bpm, beats_on, beats_off, &self.limits)?;
        let mut state = self.lock_state()?;

        if let Some(previous) = state.session.take() {
            tracing::info!("[Controller] Restarting: stopping current session");
            self.finish_session(previous, "restart");
        }

        let session = PlaybackSession::spawn(
            Arc::clone(&self.backend),
            Arc::clone(&self.samples),
            settings.clone(),
            &self.audio,
            self.volume.clone(),
            self.events.clone(),
        )?;

        tracing::info!(
            "[Controller] Started: bpm={}, beats_on={}, beats_off={}",
            bpm,
            beats_on,
            beats_off
        );
        state.session = Some(session);
        state.settings = settings;
        self.events.publish(MetronomeEventKind::Started {
            bpm,
            beats_on,
            beats_off,
        });
        Ok(())
    }

    /// `start(bpm, 1, 0)`: a downbeat on every beat.
    pub fn start_default(&self, bpm: u32) -> Result<(), AudioError> {
        self.start(bpm, 1, 0)
    }

    /// Changes tempo and pattern of the running session. The pattern
    /// restarts from its first beat at the next scheduling decision.
    pub fn update(&self, bpm: u32, beats_on: u32, beats_off: u32) -> Result<(), AudioError> {
        let settings = ClickSettings::within(bpm, beats_on, beats_off, &self.limits)?;
        let mut state = self.lock_state()?;

        match state.session.as_ref() {
            Some(session) if session.is_active() => session.update(settings.clone()),
            _ => return Err(AudioError::NotRunning),
        }

        tracing::debug!(
            "[Controller] Updated: bpm={}, beats_on={}, beats_off={}",
            bpm,
            beats_on,
            beats_off
        );
        state.settings = settings;
        self.events.publish(MetronomeEventKind::Updated {
            bpm,
            beats_on,
            beats_off,
        });
        Ok(())
    }

    /// Stops playback and waits for the sink to be released.
    ///
    /// A no-op when nothing is playing. If the session had already died on a
    /// sink error, that error is returned here.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut state = self.lock_state()?;
        let Some(session) = state.session.take() else {
            return Ok(());
        };

        let summary = session.shutdown()?;
        self.publish_stopped(summary);
        Ok(())
    }

    /// Registers a tap. See `tap_tempo_at`.
    pub fn tap_tempo(&self) -> Result<Option<u32>, AudioError> {
        self.tap_tempo_at(Instant::now())
    }

    /// Registers a tap made at `now`.
    ///
    /// The second of two close taps sets the tempo, keeping the current
    /// pattern. A running session picks it up like an `update`; otherwise it
    /// becomes the tempo for `tempo()`. Returns the new tempo, or `None` when
    /// the tap only armed the measurement.
    pub fn tap_tempo_at(&self, now: Instant) -> Result<Option<u32>, AudioError> {
        let tapped = self
            .tap
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "tap_tempo".to_string(),
            })?
            .tap(now);
        let Some(bpm) = tapped else {
            return Ok(None);
        };

        let mut state = self.lock_state()?;
        let (beats_on, beats_off) = (state.settings.beats_on(), state.settings.beats_off());
        let settings = ClickSettings::within(bpm, beats_on, beats_off, &self.limits)?;

        if let Some(session) = state.session.as_ref().filter(|s| s.is_active()) {
            session.update(settings.clone());
            self.events.publish(MetronomeEventKind::Updated {
                bpm,
                beats_on,
                beats_off,
            });
        }
        tracing::debug!("[Controller] Tapped tempo: bpm={}", bpm);
        state.settings = settings;
        Ok(Some(bpm))
    }

    pub fn is_running(&self) -> bool {
        self.peek_state()
            .session
            .as_ref()
            .is_some_and(PlaybackSession::is_active)
    }

    pub fn tempo(&self) -> u32 {
        self.peek_state().settings.bpm()
    }

    pub fn settings(&self) -> ClickSettings {
        self.peek_state().settings.clone()
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Applies to the live sink from its next write or callback.
    ///
    /// # Errors
    /// `VolumeOutOfRange` outside [0, 1]; the previous volume is kept.
    pub fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.volume.set(volume)?;
        self.events
            .publish(MetronomeEventKind::VolumeChanged { volume });
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.events.subscribe()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn finish_session(&self, session: PlaybackSession, context: &str) {
        match session.shutdown() {
            Ok(summary) => self.publish_stopped(summary),
            // Already published as `Failed` by the worker.
            Err(err) => log_audio_error(&err, context),
        }
    }

    fn publish_stopped(&self, summary: SessionSummary) {
        tracing::info!(
            "[Controller] Stopped after {} beats ({} frames)",
            summary.beats,
            summary.frames_written
        );
        self.events.publish(MetronomeEventKind::Stopped {
            beats: summary.beats,
            frames_written: summary.frames_written,
        });
    }
}

impl Drop for MetronomeController {
    fn drop(&mut self) {
        let session = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .take();
        if let Some(session) = session {
            self.finish_session(session, "controller drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SAMPLE_RATE;
    use crate::engine::backend::StubBackend;

    fn controller(backend: &StubBackend) -> MetronomeController {
        MetronomeController::with_backend(
            &MetronomeConfig::default(),
            Arc::new(backend.clone()),
            ClickSamples::synthesized(SAMPLE_RATE),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_before_start() {
        let metronome = controller(&StubBackend::new());
        assert!(!metronome.is_running());
        assert_eq!(metronome.tempo(), 120);
        assert_eq!(metronome.volume(), 1.0);
        assert_eq!(metronome.backend_name(), "stub");
    }

    #[test]
    fn test_rejects_degenerate_settings() {
        let backend = StubBackend::new();
        let metronome = controller(&backend);

        assert!(matches!(
            metronome.start(0, 1, 0),
            Err(AudioError::TempoInvalid { bpm: 0 })
        ));
        assert!(matches!(
            metronome.start(120, 0, 0),
            Err(AudioError::PatternEmpty { .. })
        ));
        assert!(!metronome.is_running());
        assert_eq!(backend.stats().opened, 0);
    }

    #[test]
    fn test_rejects_oversized_pattern() {
        let backend = StubBackend::new();
        let metronome = controller(&backend);

        for (beats_on, beats_off) in [(u32::MAX, 1), (33, 0), (1, 33)] {
            assert!(matches!(
                metronome.start(120, beats_on, beats_off),
                Err(AudioError::PatternTooLong { .. })
            ));
        }
        assert!(!metronome.is_running());
        assert_eq!(backend.stats().opened, 0);
    }

    #[test]
    fn test_tap_tempo_sets_idle_tempo() {
        let backend = StubBackend::new();
        let metronome = controller(&backend);
        let t0 = Instant::now();

        assert_eq!(metronome.tap_tempo_at(t0).unwrap(), None);
        assert_eq!(metronome.tempo(), 120);
        assert_eq!(
            metronome
                .tap_tempo_at(t0 + std::time::Duration::from_millis(750))
                .unwrap(),
            Some(80)
        );
        assert_eq!(metronome.tempo(), 80);
        assert!(!metronome.is_running());
        assert_eq!(backend.stats().opened, 0);
    }

    #[test]
    fn test_tap_tempo_updates_running_session() {
        let backend = StubBackend::new().paced(50.0);
        let metronome = controller(&backend);
        let mut events = metronome.subscribe();
        metronome.start(90, 3, 1).unwrap();

        let t0 = Instant::now();
        metronome.tap_tempo_at(t0).unwrap();
        // 10ms apart is 6000 BPM, clamped to the 400 BPM ceiling.
        assert_eq!(
            metronome
                .tap_tempo_at(t0 + std::time::Duration::from_millis(10))
                .unwrap(),
            Some(400)
        );
        let settings = metronome.settings();
        assert_eq!(
            (settings.bpm(), settings.beats_on(), settings.beats_off()),
            (400, 3, 1)
        );
        metronome.stop().unwrap();

        let kinds: Vec<MetronomeEventKind> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.kind)
            .collect();
        assert!(kinds.contains(&MetronomeEventKind::Updated {
            bpm: 400,
            beats_on: 3,
            beats_off: 1
        }));
    }

    #[test]
    fn test_invalid_config_limits_rejected() {
        let mut config = MetronomeConfig::default();
        config.limits.min_tempo = 500;
        let result = MetronomeController::with_backend(
            &config,
            Arc::new(StubBackend::new()),
            ClickSamples::synthesized(SAMPLE_RATE),
        );
        assert!(matches!(result, Err(AudioError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_invalid_config_defaults_rejected() {
        let mut config = MetronomeConfig::default();
        config.defaults.volume = 2.0;
        let result = MetronomeController::with_backend(
            &config,
            Arc::new(StubBackend::new()),
            ClickSamples::synthesized(SAMPLE_RATE),
        );
        assert!(matches!(result, Err(AudioError::VolumeOutOfRange { .. })));
    }

    #[test]
    fn test_drop_releases_sink() {
        let backend = StubBackend::new().paced(50.0);
        {
            let metronome = controller(&backend);
            metronome.start_default(120).unwrap();
        }
        let stats = backend.stats();
        assert_eq!((stats.opened, stats.released, stats.live), (1, 1, 0));
    }
}
