//! Click sounds shared by every playback session.
//!
//! `ClickSamples` holds the primary-accent (tick) and secondary-accent (tock)
//! buffers as one value. Both are PCM16 mono at the sink rate and have the
//! same length; the scheduler's frame accounting depends on it.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ClickSourceConfig, SAMPLE_RATE};
use crate::error::AudioError;

/// Duration of the built-in click sounds in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Pitch of the built-in downbeat
const TOCK_FREQUENCY_HZ: f32 = 1760.0;

/// Read-only pair of equal-length click buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickSamples {
    primary: Box<[i16]>,
    secondary: Box<[i16]>,
}

impl ClickSamples {
    /// Wraps caller-supplied buffers.
    ///
    /// # Errors
    /// `SamplesInvalid` if either buffer is empty or their lengths differ.
    pub fn new(primary: Vec<i16>, secondary: Vec<i16>) -> Result<Self, AudioError> {
        if primary.is_empty() || secondary.is_empty() {
            return Err(AudioError::SamplesInvalid {
                reason: "click buffers must not be empty".to_string(),
            });
        }
        if primary.len() != secondary.len() {
            return Err(AudioError::SamplesInvalid {
                reason: format!(
                    "click buffers differ in length (primary {} frames, secondary {} frames)",
                    primary.len(),
                    secondary.len()
                ),
            });
        }
        Ok(Self {
            primary: primary.into_boxed_slice(),
            secondary: secondary.into_boxed_slice(),
        })
    }

    /// Built-in sounds: a decaying noise burst for the tick and a pitched
    /// ping for the tock, 20ms each.
    ///
    /// Noise uses a fixed seed, so the output is identical across calls.
    pub fn synthesized(sample_rate: u32) -> Self {
        let num_samples = ((sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize).max(1);
        let mut rng = StdRng::seed_from_u64(42);

        let mut primary = Vec::with_capacity(num_samples);
        let mut secondary = Vec::with_capacity(num_samples);
        for i in 0..num_samples {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-(i as f32) / (num_samples as f32 / 5.0)).exp();

            let noise: f32 = rng.gen_range(-1.0..1.0);
            primary.push(to_pcm16(noise * envelope * 0.6));

            let tone = (2.0 * std::f32::consts::PI * TOCK_FREQUENCY_HZ * t).sin();
            secondary.push(to_pcm16((tone * 0.85 + noise * 0.15) * envelope * 0.9));
        }

        Self {
            primary: primary.into_boxed_slice(),
            secondary: secondary.into_boxed_slice(),
        }
    }

    /// Loads both sounds from WAV files.
    ///
    /// Files must be mono, 16-bit integer PCM at the sink rate and the same
    /// length.
    pub fn from_wav_files<P: AsRef<Path>, Q: AsRef<Path>>(
        primary: P,
        secondary: Q,
    ) -> Result<Self, AudioError> {
        let primary = read_pcm16_mono(primary.as_ref())?;
        let secondary = read_pcm16_mono(secondary.as_ref())?;
        Self::new(primary, secondary)
    }

    /// WAV files when both paths are configured, built-in sounds otherwise.
    pub fn from_config(config: &ClickSourceConfig) -> Result<Self, AudioError> {
        match (&config.primary_wav, &config.secondary_wav) {
            (Some(primary), Some(secondary)) => Self::from_wav_files(primary, secondary),
            (None, None) => Ok(Self::synthesized(SAMPLE_RATE)),
            _ => Err(AudioError::SamplesInvalid {
                reason: "primary_wav and secondary_wav must be configured together".to_string(),
            }),
        }
    }

    /// Tick played on accented beats after the downbeat.
    pub fn primary(&self) -> &[i16] {
        &self.primary
    }

    /// Tock played on the downbeat.
    pub fn secondary(&self) -> &[i16] {
        &self.secondary
    }

    /// Length of either buffer in frames.
    pub fn frames(&self) -> usize {
        self.primary.len()
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn read_pcm16_mono(path: &Path) -> Result<Vec<i16>, AudioError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
        || spec.sample_rate != SAMPLE_RATE
    {
        return Err(AudioError::SamplesInvalid {
            reason: format!(
                "{} must be mono 16-bit PCM at {} Hz (found {} ch, {} bit, {} Hz)",
                path.display(),
                SAMPLE_RATE,
                spec.channels,
                spec.bits_per_sample,
                spec.sample_rate
            ),
        });
    }
    reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(AudioError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::path::PathBuf;

    fn temp_wav(name: &str, spec: hound::WavSpec, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "practice_metronome_{}_{}.wav",
            std::process::id(),
            name
        ));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn mono_spec(sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let err = ClickSamples::new(vec![1; 10], vec![2; 11]).unwrap_err();
        assert!(matches!(err, AudioError::SamplesInvalid { .. }));
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_rejects_empty_buffers() {
        assert!(ClickSamples::new(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_synthesized_clicks() {
        let samples = ClickSamples::synthesized(SAMPLE_RATE);
        let expected = (SAMPLE_RATE as f32 * CLICK_DURATION_MS / 1000.0) as usize;
        assert_eq!(samples.frames(), expected);
        assert_eq!(samples.primary().len(), samples.secondary().len());
        assert_ne!(samples.primary(), samples.secondary());
        assert!(samples.primary().iter().any(|&s| s != 0));
    }

    #[test]
    fn test_synthesized_is_deterministic() {
        assert_eq!(
            ClickSamples::synthesized(SAMPLE_RATE),
            ClickSamples::synthesized(SAMPLE_RATE)
        );
    }

    #[test]
    fn test_loads_wav_pair() {
        let tick = temp_wav("tick", mono_spec(SAMPLE_RATE), &[100, -100, 50]);
        let tock = temp_wav("tock", mono_spec(SAMPLE_RATE), &[200, -200, 75]);

        let samples = ClickSamples::from_wav_files(&tick, &tock).unwrap();
        assert_eq!(samples.primary(), &[100, -100, 50]);
        assert_eq!(samples.secondary(), &[200, -200, 75]);

        let _ = std::fs::remove_file(tick);
        let _ = std::fs::remove_file(tock);
    }

    #[test]
    fn test_rejects_wrong_sample_rate() {
        let tick = temp_wav("tick_44k", mono_spec(44100), &[1, 2, 3]);
        let tock = temp_wav("tock_44k", mono_spec(44100), &[1, 2, 3]);

        let err = ClickSamples::from_wav_files(&tick, &tock).unwrap_err();
        assert!(err.message().contains("22050"));

        let _ = std::fs::remove_file(tick);
        let _ = std::fs::remove_file(tock);
    }

    #[test]
    fn test_from_config_requires_both_paths() {
        let config = ClickSourceConfig {
            primary_wav: Some(PathBuf::from("tick.wav")),
            secondary_wav: None,
        };
        assert!(ClickSamples::from_config(&config).is_err());
        assert!(ClickSamples::from_config(&ClickSourceConfig::default()).is_ok());
    }
}
