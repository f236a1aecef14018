//! Playback engine: platform sinks, the worker session and the controller
//! that hosts talk to.

pub mod backend;
pub mod core;
pub mod events;
pub mod session;

pub use backend::{default_backend, AudioBackend, AudioSink, SharedVolume, SinkFormat, StubBackend};
pub use core::MetronomeController;
pub use events::{EventPublisher, MetronomeEvent, MetronomeEventKind};
pub use session::PlaybackSession;
