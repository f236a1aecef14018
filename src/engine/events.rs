//! Lifecycle events broadcast by the metronome controller.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{AudioError, ErrorCode};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event emitted by the controller or its click worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetronomeEvent {
    /// Milliseconds since the controller was created
    pub timestamp_ms: u64,
    pub kind: MetronomeEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetronomeEventKind {
    Started {
        bpm: u32,
        beats_on: u32,
        beats_off: u32,
    },
    Updated {
        bpm: u32,
        beats_on: u32,
        beats_off: u32,
    },
    Stopped {
        beats: u64,
        frames_written: u64,
    },
    /// Playback ended because the sink failed
    Failed { code: i32, message: String },
    VolumeChanged { volume: f32 },
}

impl MetronomeEventKind {
    pub fn failed(err: &AudioError) -> Self {
        Self::Failed {
            code: err.code(),
            message: err.message(),
        }
    }
}

/// Cloneable handle that stamps and sends events.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<MetronomeEvent>,
    epoch: Instant,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            epoch: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, kind: MetronomeEventKind) {
        let timestamp_ms = self.epoch.elapsed().as_millis() as u64;
        // No subscribers is fine.
        let _ = self.tx.send(MetronomeEvent { timestamp_ms, kind });
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
