// SPDX-License-Identifier: MPL-2.0
//! Headless demo: plays a stream for a few seconds and logs what would be
//! on screen.
//!
//! ```text
//! vidclock [--seconds N] [--fps F] [--config PATH] [--no-audio] [--file PATH]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use vidclock::audio::{AudioContext, SimulatedContext};
use vidclock::clock::{ManualClock, SharedWallClock};
use vidclock::config::{self, PlayerConfig};
use vidclock::decoder::{MediaDecoder, SyntheticDecoder, SyntheticStream};
use vidclock::{Player, Result};

const DEFAULT_SECONDS: f64 = 3.0;
const DEFAULT_FPS: f64 = 30.0;
const DEMO_SAMPLE_RATE: u32 = 44_100;
const REDRAW_INTERVAL: Duration = Duration::from_millis(16);

struct Args {
    seconds: f64,
    fps: f64,
    config: Option<PathBuf>,
    no_audio: bool,
    file: Option<PathBuf>,
}

fn parse_args() -> std::result::Result<Args, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    Ok(Args {
        seconds: args
            .opt_value_from_str("--seconds")?
            .unwrap_or(DEFAULT_SECONDS),
        fps: args.opt_value_from_str("--fps")?.unwrap_or(DEFAULT_FPS),
        config: args.opt_value_from_str("--config")?,
        no_audio: args.contains("--no-audio"),
        file: args.opt_value_from_str("--file")?,
    })
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn main() {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            tracing::error!(%e, "invalid arguments");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&args) {
        tracing::error!(%e, "playback failed");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load().unwrap_or_default(),
    };

    match &args.file {
        Some(path) => run_file(path, args, &config),
        None => run_synthetic(args, &config),
    }
}

#[cfg(feature = "ffmpeg")]
fn run_file(path: &std::path::Path, args: &Args, config: &PlayerConfig) -> Result<()> {
    let decoder = vidclock::decoder::FfmpegDecoder::open(path)?;
    let info = decoder.info();
    let context = if args.no_audio || info.audio_streams == 0 {
        None
    } else {
        open_device(info.sample_rate)
    };
    let player = Player::open(decoder, context.as_deref(), config)?;
    play_realtime(player, args.seconds)
}

#[cfg(not(feature = "ffmpeg"))]
fn run_file(path: &std::path::Path, _args: &Args, _config: &PlayerConfig) -> Result<()> {
    Err(vidclock::Error::Decoder(format!(
        "cannot open {}: built without the `ffmpeg` feature",
        path.display()
    )))
}

#[cfg(all(feature = "ffmpeg", feature = "cpal"))]
fn open_device(sample_rate: u32) -> Option<Box<dyn AudioContext>> {
    match vidclock::audio::CpalContext::new(sample_rate) {
        Ok(context) => Some(Box::new(context)),
        Err(e) => {
            tracing::warn!(%e, "no audio output, audio will not play");
            None
        }
    }
}

#[cfg(all(feature = "ffmpeg", not(feature = "cpal")))]
fn open_device(_sample_rate: u32) -> Option<Box<dyn AudioContext>> {
    tracing::warn!("built without the `cpal` feature, audio will not play");
    None
}

/// Plays a file against the system clock, polling like a host redraw loop.
#[cfg(feature = "ffmpeg")]
fn play_realtime<D: MediaDecoder + 'static>(mut player: Player<D>, seconds: f64) -> Result<()> {
    let run_for = Duration::from_secs_f64(seconds.max(0.0));
    let started = Instant::now();
    player.play();
    while started.elapsed() < run_for {
        player.current_frame();
        tracing::info!(
            position = ?player.position(),
            frame_time = player.lock().video_time(),
            "redraw"
        );
        std::thread::sleep(REDRAW_INTERVAL);
    }
    Ok(())
}

/// Plays a synthetic stream on a simulated clock, so the demo runs without
/// devices and finishes instantly.
fn run_synthetic(args: &Args, config: &PlayerConfig) -> Result<()> {
    let duration = Duration::from_secs_f64(args.seconds.max(0.0) + 1.0);
    let mut stream = SyntheticStream::new(320, 180, args.fps, duration);
    if !args.no_audio {
        stream = stream.with_audio(2, DEMO_SAMPLE_RATE);
    }

    let clock = ManualClock::new();
    let context = SimulatedContext::with_quantum(DEMO_SAMPLE_RATE, Duration::from_millis(20));
    let audio_context: Option<&dyn AudioContext> = if args.no_audio {
        None
    } else {
        Some(&context)
    };
    let wall: SharedWallClock = Arc::new(clock.clone());
    let mut player = Player::open_with_clock(
        SyntheticDecoder::new(stream),
        audio_context,
        config,
        wall,
    )?;
    let sink = context.last_sink();

    tracing::info!(
        resolution = ?player.resolution(),
        fps = player.frame_rate(),
        has_audio = player.has_audio(),
        "synthetic stream opened"
    );

    let started = Instant::now();
    player.play();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let redraws = (args.seconds.max(0.0) / REDRAW_INTERVAL.as_secs_f64()).ceil() as u64;
    for _ in 0..redraws {
        clock.advance(REDRAW_INTERVAL);
        if let Some(sink) = &sink {
            sink.pump(REDRAW_INTERVAL);
        }
        let frame = player.current_frame();
        let shown = SyntheticDecoder::frame_index_of(frame.as_raw());
        tracing::debug!(position = ?player.position(), ?shown, "redraw");
    }
    player.pause();

    tracing::info!(
        position = ?player.position(),
        frame_time = player.lock().video_time(),
        elapsed = ?started.elapsed(),
        "playback finished"
    );
    Ok(())
}
