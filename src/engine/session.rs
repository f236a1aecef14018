//! PlaybackSession - one click worker thread and the handles that steer it
//!
//! The sink is opened on the worker itself because some platform streams
//! cannot cross threads. `spawn` waits for that open to finish so device
//! errors are reported to the caller of `start` rather than lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::watch;

use crate::audio::{ClickSamples, ClickScheduler, ClickSettings, SessionSummary};
use crate::config::AudioConfig;
use crate::engine::backend::{AudioBackend, SharedVolume, SinkFormat};
use crate::engine::events::{EventPublisher, MetronomeEventKind};
use crate::error::{log_audio_error, AudioError};

const WORKER_THREAD_NAME: &str = "metronome-clicks";

type WorkerResult = Result<SessionSummary, AudioError>;

pub struct PlaybackSession {
    cancel: Arc<AtomicBool>,
    settings_tx: watch::Sender<ClickSettings>,
    worker: Option<JoinHandle<WorkerResult>>,
}

impl PlaybackSession {
    /// Opens a sink on a new worker thread and starts the click loop there.
    ///
    /// Returns once the sink is open. Open failures are returned here and
    /// leave no thread behind.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        samples: Arc<ClickSamples>,
        settings: ClickSettings,
        audio: &AudioConfig,
        volume: SharedVolume,
        events: EventPublisher,
    ) -> Result<Self, AudioError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (settings_tx, settings_rx) = watch::channel(settings.clone());
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);

        let format = SinkFormat::from_config(audio);
        let audio = audio.clone();
        let worker_cancel = Arc::clone(&cancel);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || -> WorkerResult {
                let sink = match backend.open_sink(format, volume) {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(()));
                        sink
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.clone()));
                        return Err(err);
                    }
                };
                tracing::debug!("[PlaybackSession] {} sink open", backend.name());

                let result = ClickScheduler::new(samples, settings, format.sample_rate, &audio)
                    .with_updates(settings_rx)
                    .run(sink, &worker_cancel);

                if let Err(err) = &result {
                    log_audio_error(err, "click worker");
                    events.publish(MetronomeEventKind::failed(err));
                }
                result
            })
            .map_err(|e| AudioError::WorkerFailed {
                reason: format!("Failed to spawn click worker: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cancel,
                settings_tx,
                worker: Some(worker),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            // The worker dropped the handshake without answering: it panicked.
            Err(_) => Err(join_worker(worker)
                .err()
                .unwrap_or_else(|| AudioError::WorkerFailed {
                    reason: "click worker exited before opening the sink".to_string(),
                })),
        }
    }

    /// Publishes new settings; the worker applies them before its next write.
    pub fn update(&self, settings: ClickSettings) {
        self.settings_tx.send_replace(settings);
    }

    /// False once the worker has exited, whether cancelled or failed.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Cancels the worker and waits for it to release the sink.
    pub fn shutdown(mut self) -> WorkerResult {
        self.cancel_and_join()
    }

    fn cancel_and_join(&mut self) -> WorkerResult {
        self.cancel.store(true, Ordering::Release);
        match self.worker.take() {
            Some(worker) => join_worker(worker),
            None => Ok(SessionSummary::default()),
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.cancel_and_join() {
                log_audio_error(&err, "session drop");
            }
        }
    }
}

fn join_worker(worker: JoinHandle<WorkerResult>) -> WorkerResult {
    worker.join().unwrap_or_else(|_| {
        Err(AudioError::WorkerFailed {
            reason: "click worker panicked".to_string(),
        })
    })
}
