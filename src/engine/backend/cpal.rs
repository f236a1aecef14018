//! CPAL-based sink for desktop platforms (Linux, macOS, Windows)
//!
//! cpal is callback driven, so the blocking-write contract is rebuilt on top
//! of an rtrb ring sized to the device buffer: `write` pushes PCM16 frames
//! and waits for free slots, and the output callback drains the ring at the
//! device rate. Underruns play silence.
//!
//! The stream runs at 22050 Hz when the device supports it. Otherwise it
//! runs at the device's default rate and the callback resamples, draining
//! `sink_rate / device_rate` ring frames per output frame so write pacing
//! still follows the sink rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ::cpal::{Device, SampleFormat, SampleRate, Stream, SupportedStreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::AudioError;

use super::{AudioBackend, AudioSink, SharedVolume, SinkFormat};

/// How long `write` waits before re-checking a full ring.
const WRITE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A full ring that frees no slot for this many device buffers means the
/// device stopped calling back.
const STALL_BUFFERS: u32 = 2;

/// Opens sinks on the default output device.
#[derive(Default)]
pub struct CpalBackend {
    _unit: (),
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open_sink(
        &self,
        format: SinkFormat,
        volume: SharedVolume,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(Box::new(CpalSink::open(format, volume)?))
    }
}

/// Streaming output backed by a cpal stream.
pub struct CpalSink {
    stream: Stream,
    producer: Producer<i16>,
    format: SinkFormat,
    volume: SharedVolume,
    failed: Arc<AtomicBool>,
    stall_timeout: Duration,
}

impl CpalSink {
    pub fn open(format: SinkFormat, volume: SharedVolume) -> Result<Self, AudioError> {
        let host = ::cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default output device found".to_string(),
            })?;

        let supported = select_config(&device, format.sample_rate)?;
        let device_rate = supported.sample_rate().0;
        // The device mixes our mono stream to however many channels it has.
        let stream_config = supported.config();

        let (producer, consumer) = RingBuffer::<i16>::new(format.device_buffer_frames.max(1));
        let failed = Arc::new(AtomicBool::new(false));
        let converter = RateConverter::new(format.sample_rate, device_rate);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                consumer,
                converter,
                volume.clone(),
                Arc::clone(&failed),
            )?,
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                consumer,
                converter,
                volume.clone(),
                Arc::clone(&failed),
            )?,
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &stream_config,
                consumer,
                converter,
                volume.clone(),
                Arc::clone(&failed),
            )?,
            other => {
                return Err(AudioError::StreamOpenFailed {
                    reason: format!("Unsupported output sample format: {:?}", other),
                })
            }
        };

        tracing::info!(
            "[CpalSink] Opened {:?} at {} Hz (writes at {} Hz), {} channel(s), {} frame buffer",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            device_rate,
            format.sample_rate,
            stream_config.channels,
            format.device_buffer_frames
        );

        Ok(Self {
            stream,
            producer,
            format,
            volume,
            failed,
            stall_timeout: format.frames_to_duration(format.device_buffer_frames) * STALL_BUFFERS,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &::cpal::StreamConfig,
        mut consumer: Consumer<i16>,
        mut converter: RateConverter,
        volume: SharedVolume,
        failed: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError>
    where
        T: ::cpal::SizedSample + ::cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let err_fn = move |err| {
            tracing::error!("[CpalSink] Output stream error: {}", err);
            failed.store(true, Ordering::Relaxed);
        };

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &::cpal::OutputCallbackInfo| {
                    let gain = volume.get();
                    for frame in data.chunks_mut(channels) {
                        let pcm = converter.next_sample(|| consumer.pop().ok());
                        let value = pcm / i16::MAX as f32 * gain;
                        for sample in frame.iter_mut() {
                            *sample = T::from_sample(value);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })
    }
}

/// Preference among the sample formats the callback can fill.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// A supported config at `sample_rate` if the device has one, else the
/// device default.
fn select_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig, AudioError> {
    match device.supported_output_configs() {
        Ok(configs) => {
            let native = configs
                .filter(|range| {
                    (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&sample_rate)
                })
                .filter_map(|range| {
                    format_rank(range.sample_format()).map(|rank| ((rank, range.channels()), range))
                })
                .min_by_key(|(key, _)| *key)
                .map(|(_, range)| range.with_sample_rate(SampleRate(sample_rate)));
            if let Some(config) = native {
                return Ok(config);
            }
            tracing::info!(
                "[CpalSink] Device has no {} Hz config; resampling to its default rate",
                sample_rate
            );
        }
        Err(e) => {
            tracing::warn!(
                "[CpalSink] Could not list output configs ({:?}); using the default",
                e
            );
        }
    }

    device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })
}

/// Linear interpolation from the sink rate to the device rate.
///
/// Pulls exactly one source frame each time the phase crosses a whole
/// frame, so over time it consumes `source_rate / device_rate` frames per
/// output frame. At equal rates it is a two-frame delay.
struct RateConverter {
    step: f64,
    phase: f64,
    previous: f32,
    next: f32,
}

impl RateConverter {
    fn new(source_rate: u32, device_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / device_rate.max(1) as f64,
            phase: 0.0,
            previous: 0.0,
            next: 0.0,
        }
    }

    /// Next output sample in PCM16 units. A `None` from `pop` is silence.
    fn next_sample(&mut self, mut pop: impl FnMut() -> Option<i16>) -> f32 {
        let value = self.previous + (self.next - self.previous) * self.phase as f32;
        self.phase += self.step;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.previous = self.next;
            self.next = pop().map_or(0.0, f32::from);
        }
        value
    }
}

fn check_stream(failed: &AtomicBool, producer: &Producer<i16>) -> Result<(), AudioError> {
    if failed.load(Ordering::Relaxed) {
        return Err(AudioError::StreamFailure {
            reason: "output device reported an error".to_string(),
        });
    }
    if producer.is_abandoned() {
        return Err(AudioError::StreamFailure {
            reason: "output callback dropped".to_string(),
        });
    }
    Ok(())
}

/// Pushes all of `frames`, sleeping while the ring is full.
///
/// # Errors
/// - Whatever `check` reports between waits
/// - `StreamFailure` when the ring frees no slot for `stall_timeout`
fn push_frames(
    producer: &mut Producer<i16>,
    frames: &[i16],
    stall_timeout: Duration,
    mut check: impl FnMut(&Producer<i16>) -> Result<(), AudioError>,
) -> Result<usize, AudioError> {
    let mut written = 0;
    let mut last_progress = Instant::now();
    while written < frames.len() {
        check(producer)?;
        let free = producer.slots();
        if free == 0 {
            if last_progress.elapsed() >= stall_timeout {
                return Err(AudioError::StreamFailure {
                    reason: format!(
                        "output device consumed no frames for {} ms",
                        stall_timeout.as_millis()
                    ),
                });
            }
            thread::sleep(WRITE_POLL_INTERVAL);
            continue;
        }
        let end = (written + free).min(frames.len());
        for &sample in &frames[written..end] {
            // Slots were counted above and only this thread pushes.
            if producer.push(sample).is_err() {
                break;
            }
            written += 1;
        }
        last_progress = Instant::now();
    }
    Ok(written)
}

impl AudioSink for CpalSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Output start failed: {}", e),
        })
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        let failed = &self.failed;
        push_frames(&mut self.producer, frames, self.stall_timeout, |producer| {
            check_stream(failed, producer)
        })
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream.pause().map_err(|e| AudioError::HardwareError {
            details: format!("Output stop failed: {}", e),
        })
    }

    fn release(self: Box<Self>) -> Result<(), AudioError> {
        drop(self);
        tracing::debug!("[CpalSink] Released output stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_failure(_: &Producer<i16>) -> Result<(), AudioError> {
        Ok(())
    }

    #[test]
    fn test_write_fails_when_device_stops_draining() {
        // Consumer kept alive but never drained: a stalled device.
        let (mut producer, consumer) = RingBuffer::<i16>::new(4);
        let started = Instant::now();

        let result = push_frames(
            &mut producer,
            &[1; 10],
            Duration::from_millis(30),
            no_failure,
        );

        assert!(matches!(result, Err(AudioError::StreamFailure { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(consumer.slots(), 4);
    }

    #[test]
    fn test_write_waits_for_slow_device() {
        let (mut producer, mut consumer) = RingBuffer::<i16>::new(4);
        let drain = thread::spawn(move || {
            let mut received = Vec::new();
            while received.len() < 12 {
                match consumer.pop() {
                    Ok(sample) => received.push(sample),
                    Err(_) => thread::sleep(Duration::from_millis(5)),
                }
            }
            received
        });

        let frames: Vec<i16> = (0..12).collect();
        let written = push_frames(&mut producer, &frames, Duration::from_secs(2), no_failure)
            .expect("device keeps draining");

        assert_eq!(written, 12);
        assert_eq!(drain.join().unwrap(), frames);
    }

    #[test]
    fn test_write_reports_dropped_callback() {
        let (mut producer, consumer) = RingBuffer::<i16>::new(4);
        drop(consumer);
        let failed = AtomicBool::new(false);

        let result = push_frames(&mut producer, &[1; 2], Duration::from_secs(2), |p| {
            check_stream(&failed, p)
        });
        assert!(matches!(result, Err(AudioError::StreamFailure { .. })));
    }

    #[test]
    fn test_converter_consumes_at_sink_rate() {
        let mut popped = 0usize;
        let mut converter = RateConverter::new(22050, 44100);
        for _ in 0..100 {
            converter.next_sample(|| {
                popped += 1;
                Some(0)
            });
        }
        assert_eq!(popped, 50);

        let mut popped = 0usize;
        let mut converter = RateConverter::new(22050, 48000);
        for _ in 0..48000 {
            converter.next_sample(|| {
                popped += 1;
                Some(0)
            });
        }
        assert!((22049..=22050).contains(&popped), "popped {}", popped);
    }

    #[test]
    fn test_converter_interpolates() {
        let mut converter = RateConverter::new(22050, 44100);
        let out: Vec<f32> = (0..6).map(|_| converter.next_sample(|| Some(1000))).collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 500.0, 1000.0, 1000.0]);
    }

    #[test]
    fn test_converter_passes_through_at_equal_rates() {
        let mut source = [100i16, 200, 300, 400].into_iter();
        let mut converter = RateConverter::new(22050, 22050);
        let out: Vec<f32> = (0..6)
            .map(|_| converter.next_sample(|| source.next()))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 100.0, 200.0, 300.0, 400.0]);
    }
}
