//! Integration tests for the MetronomeController lifecycle
//!
//! These tests drive the controller through its public API against the
//! recording stub backend, covering:
//! - start/stop lifecycle and idempotent stop
//! - stop latency bounded by one silence chunk
//! - live tempo updates reaching the click worker
//! - volume validation
//! - session replacement never leaving two sinks open
//! - device failures surfacing through `start`, `stop` and events

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use practice_metronome::audio::ClickSamples;
use practice_metronome::config::{MetronomeConfig, SAMPLE_RATE, WRITE_CHUNK_FRAMES};
use practice_metronome::engine::backend::StubBackend;
use practice_metronome::engine::{MetronomeController, MetronomeEventKind};
use practice_metronome::error::AudioError;

const CLICK_FRAMES: usize = 100;

/// Stub sinks play 100x faster than real time.
fn paced_backend() -> StubBackend {
    StubBackend::new().paced(100.0)
}

fn controller(backend: &StubBackend) -> MetronomeController {
    let samples = ClickSamples::new(vec![1000; CLICK_FRAMES], vec![2000; CLICK_FRAMES])
        .expect("valid click samples");
    MetronomeController::with_backend(&MetronomeConfig::default(), Arc::new(backend.clone()), samples)
        .expect("controller")
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Frame offsets of every non-silent write.
fn click_offsets(backend: &StubBackend) -> Vec<u64> {
    backend
        .stats()
        .writes
        .iter()
        .filter(|w| !w.is_silent())
        .map(|w| w.offset)
        .collect()
}

#[test]
fn test_start_stop_lifecycle() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    metronome.start(120, 1, 0).expect("start");
    assert!(metronome.is_running());
    assert_eq!(metronome.tempo(), 120);

    assert!(wait_until(|| click_offsets(&backend).len() >= 3));
    metronome.stop().expect("stop");
    assert!(!metronome.is_running());

    let offsets = click_offsets(&backend);
    for pair in offsets.windows(2) {
        assert_eq!(pair[1] - pair[0], 11025);
    }

    let stats = backend.stats();
    assert_eq!((stats.opened, stats.released, stats.live), (1, 1, 0));
}

#[test]
fn test_stop_returns_within_one_chunk() {
    // Real-time pacing: each silence write blocks for up to 0.4 s.
    let backend = StubBackend::new().paced(1.0);
    let metronome = controller(&backend);
    let chunk = Duration::from_secs_f64(WRITE_CHUNK_FRAMES as f64 / SAMPLE_RATE as f64);

    // 40 BPM leaves long stretches of silence between clicks.
    metronome.start(40, 1, 0).expect("start");
    thread::sleep(Duration::from_millis(150));

    let started = Instant::now();
    metronome.stop().expect("stop");
    let elapsed = started.elapsed();

    assert!(!metronome.is_running());
    assert!(
        elapsed < chunk + Duration::from_millis(250),
        "stop took {:?}, chunk is {:?}",
        elapsed,
        chunk
    );
    assert_eq!(backend.stats().live, 0);
}

#[test]
fn test_oversized_pattern_is_rejected() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    for (beats_on, beats_off) in [(u32::MAX, 1), (1, u32::MAX), (33, 0)] {
        assert!(matches!(
            metronome.start(120, beats_on, beats_off),
            Err(AudioError::PatternTooLong { .. })
        ));
    }
    metronome.start(120, 1, 0).expect("start");
    assert!(matches!(
        metronome.update(120, u32::MAX, 1),
        Err(AudioError::PatternTooLong { .. })
    ));
    assert_eq!(metronome.settings().beats_on(), 1);
    metronome.stop().expect("stop");
    assert_eq!(backend.stats().opened, 1);
}

#[test]
fn test_tap_tempo_drives_running_metronome() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    metronome.start(120, 1, 0).expect("start");
    assert!(wait_until(|| click_offsets(&backend).len() >= 2));

    let t0 = Instant::now();
    assert_eq!(metronome.tap_tempo_at(t0).expect("tap"), None);
    assert_eq!(
        metronome
            .tap_tempo_at(t0 + Duration::from_millis(250))
            .expect("tap"),
        Some(240)
    );
    assert_eq!(metronome.tempo(), 240);

    let before = click_offsets(&backend).len();
    assert!(wait_until(|| click_offsets(&backend).len() >= before + 4));
    metronome.stop().expect("stop");

    let offsets = click_offsets(&backend);
    let gaps: Vec<u64> = offsets.windows(2).map(|p| p[1] - p[0]).collect();
    assert_eq!(&gaps[gaps.len() - 2..], &[5512, 5512]);
}

#[test]
fn test_stop_is_idempotent() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    assert!(metronome.stop().is_ok());
    metronome.start_default(200).expect("start");
    assert!(metronome.stop().is_ok());
    assert!(metronome.stop().is_ok());
    assert!(!metronome.is_running());
    assert_eq!(backend.stats().released, 1);
}

#[test]
fn test_invalid_start_leaves_controller_idle() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    assert!(matches!(
        metronome.start(0, 1, 0),
        Err(AudioError::TempoInvalid { .. })
    ));
    assert!(matches!(
        metronome.start(120, 0, 0),
        Err(AudioError::PatternEmpty { .. })
    ));
    assert!(!metronome.is_running());
    assert_eq!(backend.stats().opened, 0);
}

#[test]
fn test_update_requires_running_session() {
    let metronome = controller(&paced_backend());
    assert!(matches!(
        metronome.update(140, 1, 0),
        Err(AudioError::NotRunning)
    ));
    assert_eq!(metronome.tempo(), 120);
}

#[test]
fn test_update_changes_interval() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    metronome.start(120, 1, 0).expect("start");
    assert!(wait_until(|| click_offsets(&backend).len() >= 2));

    metronome.update(240, 1, 0).expect("update");
    assert_eq!(metronome.tempo(), 240);

    let before = click_offsets(&backend).len();
    assert!(wait_until(|| click_offsets(&backend).len() >= before + 4));
    metronome.stop().expect("stop");

    // The gap spanning the update can fall anywhere between the two
    // intervals; after it every gap is the 240 BPM one.
    let offsets = click_offsets(&backend);
    let gaps: Vec<u64> = offsets.windows(2).map(|p| p[1] - p[0]).collect();
    assert_eq!(gaps[0], 11025);
    assert!(gaps.iter().all(|&gap| (5512..=11025).contains(&gap)));
    assert_eq!(&gaps[gaps.len() - 2..], &[5512, 5512]);
}

#[test]
fn test_update_rejects_degenerate_settings() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    metronome.start(120, 1, 0).expect("start");
    assert!(metronome.update(0, 1, 0).is_err());
    assert!(metronome.update(120, 0, 0).is_err());
    assert_eq!(metronome.tempo(), 120);
    assert!(metronome.is_running());
    metronome.stop().expect("stop");
}

#[test]
fn test_volume_validation() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    assert!(matches!(
        metronome.set_volume(1.5),
        Err(AudioError::VolumeOutOfRange { .. })
    ));
    assert_eq!(metronome.volume(), 1.0);

    metronome.set_volume(0.3).expect("set_volume");
    assert_eq!(metronome.volume(), 0.3);
}

#[test]
fn test_volume_reaches_live_sink() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    metronome.set_volume(0.5).expect("set_volume");
    metronome.start(120, 1, 0).expect("start");
    assert!(wait_until(|| !click_offsets(&backend).is_empty()));
    metronome.stop().expect("stop");

    let peaks: Vec<i16> = backend
        .stats()
        .writes
        .iter()
        .filter(|w| !w.is_silent())
        .map(|w| w.peak)
        .collect();
    assert!(peaks.iter().all(|&peak| peak == 1000));
}

#[test]
fn test_rapid_restarts_keep_one_sink() {
    let backend = paced_backend();
    let metronome = controller(&backend);

    for bpm in [60, 120, 180, 240] {
        metronome.start(bpm, 2, 1).expect("start");
        metronome.stop().expect("stop");
        metronome.start(bpm, 1, 0).expect("start");
    }
    // start while running replaces the session.
    metronome.start(90, 2, 1).expect("restart");
    assert!(metronome.is_running());
    metronome.stop().expect("stop");

    let stats = backend.stats();
    assert_eq!(stats.max_live, 1);
    assert_eq!(stats.live, 0);
    assert_eq!(stats.opened, stats.released);
}

#[test]
fn test_open_failure_is_returned_from_start() {
    let backend = StubBackend::new().failing_open();
    let metronome = controller(&backend);

    assert!(matches!(
        metronome.start(120, 1, 0),
        Err(AudioError::StreamOpenFailed { .. })
    ));
    assert!(!metronome.is_running());
    assert!(metronome.stop().is_ok());
}

#[test]
fn test_write_failure_surfaces_at_stop() {
    let backend = StubBackend::new().failing_after(5);
    let metronome = controller(&backend);
    let mut events = metronome.subscribe();

    metronome.start(120, 1, 0).expect("start");
    assert!(wait_until(|| !metronome.is_running()));

    assert!(matches!(
        metronome.update(100, 1, 0),
        Err(AudioError::NotRunning)
    ));
    assert!(matches!(
        metronome.stop(),
        Err(AudioError::StreamFailure { .. })
    ));
    assert!(metronome.stop().is_ok());
    assert_eq!(backend.stats().live, 0);

    let kinds: Vec<MetronomeEventKind> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.kind)
        .collect();
    // The worker may fail before `start` publishes, so order is not fixed.
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, MetronomeEventKind::Started { bpm: 120, .. })));
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, MetronomeEventKind::Failed { code: 1007, .. })));
}

#[test]
fn test_events_follow_lifecycle() {
    let backend = paced_backend();
    let metronome = controller(&backend);
    let mut events = metronome.subscribe();

    metronome.start(90, 2, 1).expect("start");
    metronome.update(100, 3, 1).expect("update");
    metronome.set_volume(0.8).expect("volume");
    metronome.stop().expect("stop");

    let kinds: Vec<MetronomeEventKind> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds.len(), 4);
    assert_eq!(
        kinds[0],
        MetronomeEventKind::Started {
            bpm: 90,
            beats_on: 2,
            beats_off: 1
        }
    );
    assert_eq!(
        kinds[1],
        MetronomeEventKind::Updated {
            bpm: 100,
            beats_on: 3,
            beats_off: 1
        }
    );
    assert_eq!(kinds[2], MetronomeEventKind::VolumeChanged { volume: 0.8 });
    assert!(matches!(kinds[3], MetronomeEventKind::Stopped { .. }));
}

#[test]
fn test_synthesized_clicks_play() {
    let backend = paced_backend();
    let metronome = MetronomeController::with_backend(
        &MetronomeConfig::default(),
        Arc::new(backend.clone()),
        ClickSamples::synthesized(SAMPLE_RATE),
    )
    .expect("controller");

    metronome.start(120, 2, 0).expect("start");
    assert!(wait_until(|| click_offsets(&backend).len() >= 2));
    metronome.stop().expect("stop");
}
