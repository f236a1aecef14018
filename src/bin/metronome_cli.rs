use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use practice_metronome::audio::{interval_frames, ClickSamples, ClickScheduler, ClickSettings};
use practice_metronome::config::{MetronomeConfig, SAMPLE_RATE};
use practice_metronome::engine::backend::{
    default_backend, AudioBackend, AudioSink, SharedVolume, SinkFormat, StubBackend, WavSink,
};
use practice_metronome::engine::MetronomeController;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "metronome_cli",
    about = "Play, render and inspect practice metronome click tracks"
)]
struct Cli {
    /// JSON config file (defaults to assets/metronome_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct PatternArgs {
    #[arg(long, default_value_t = 120)]
    bpm: u32,
    #[arg(long, default_value_t = 1)]
    beats_on: u32,
    #[arg(long, default_value_t = 0)]
    beats_off: u32,
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play live and print controller events as JSON lines
    Play {
        #[command(flatten)]
        pattern: PatternArgs,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Switch to this tempo halfway through
        #[arg(long)]
        change_bpm: Option<u32>,
        /// Use the recording stub instead of the audio device
        #[arg(long)]
        stub: bool,
    },
    /// Render the click track offline into a WAV file
    Render {
        #[command(flatten)]
        pattern: PatternArgs,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the frame interval between beats for a tempo
    Interval {
        #[arg(long)]
        bpm: u32,
        #[arg(long, default_value_t = SAMPLE_RATE)]
        sample_rate: u32,
    },
}

fn main() -> ExitCode {
    practice_metronome::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(MetronomeConfig::load_from_file)
        .unwrap_or_else(MetronomeConfig::load);

    match cli.command {
        Commands::Play {
            pattern,
            seconds,
            change_bpm,
            stub,
        } => run_play(&config, &pattern, seconds, change_bpm, stub),
        Commands::Render {
            pattern,
            seconds,
            output,
        } => run_render(&config, &pattern, seconds, output),
        Commands::Interval { bpm, sample_rate } => run_interval(bpm, sample_rate),
    }
}

fn run_play(
    config: &MetronomeConfig,
    pattern: &PatternArgs,
    seconds: f64,
    change_bpm: Option<u32>,
    stub: bool,
) -> Result<ExitCode> {
    let backend: Arc<dyn AudioBackend> = if stub {
        Arc::new(StubBackend::new().paced(1.0))
    } else {
        default_backend()
    };
    let samples = ClickSamples::from_config(&config.clicks).context("loading click sounds")?;
    let metronome = MetronomeController::with_backend(config, backend, samples)?;

    let mut events = metronome.subscribe();
    let printer = thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("Error: {err}"),
            },
            Err(RecvError::Lagged(skipped)) => eprintln!("Skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    });

    metronome.set_volume(pattern.volume)?;
    metronome
        .start(pattern.bpm, pattern.beats_on, pattern.beats_off)
        .with_context(|| format!("starting on {} backend", metronome.backend_name()))?;

    let total = Duration::from_secs_f64(seconds.max(0.0));
    match change_bpm {
        Some(bpm) => {
            thread::sleep(total / 2);
            metronome.update(bpm, pattern.beats_on, pattern.beats_off)?;
            thread::sleep(total - total / 2);
        }
        None => thread::sleep(total),
    }

    metronome.stop().context("stopping playback")?;
    drop(metronome);
    let _ = printer.join();
    Ok(ExitCode::from(0))
}

fn run_render(
    config: &MetronomeConfig,
    pattern: &PatternArgs,
    seconds: f64,
    output: PathBuf,
) -> Result<ExitCode> {
    let samples = ClickSamples::from_config(&config.clicks).context("loading click sounds")?;
    let settings =
        ClickSettings::within(pattern.bpm, pattern.beats_on, pattern.beats_off, &config.limits)?;
    let format = SinkFormat::from_config(&config.audio);
    let volume = SharedVolume::new(pattern.volume)?;

    let mut sink = WavSink::create(&output, format, volume)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut scheduler =
        ClickScheduler::new(Arc::new(samples), settings, format.sample_rate, &config.audio);

    let target = (seconds.max(0.0) * format.sample_rate as f64) as u64;
    sink.start()?;
    while scheduler.summary().frames_written < target {
        scheduler.step(&mut sink)?;
    }
    sink.stop()?;
    let frames = sink.frames_written();
    Box::new(sink).release()?;

    let summary = scheduler.summary();
    println!(
        "{}: {} beats, {} frames ({:.2}s)",
        output.display(),
        summary.beats,
        frames,
        frames as f64 / format.sample_rate as f64
    );
    Ok(ExitCode::from(0))
}

fn run_interval(bpm: u32, sample_rate: u32) -> Result<ExitCode> {
    anyhow::ensure!(bpm > 0, "bpm must be positive");
    let frames = interval_frames(bpm, sample_rate);
    println!(
        "{} bpm at {} Hz: {} frames ({:.3} ms)",
        bpm,
        sample_rate,
        frames,
        frames as f64 * 1000.0 / sample_rate as f64
    );
    Ok(ExitCode::from(0))
}
