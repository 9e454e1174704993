// SPDX-License-Identifier: MPL-2.0
//! Audio output using cpal.
//!
//! Each sink owns one output stream. `cpal::Stream` is not `Send` on every
//! platform, so the stream lives on a dedicated thread that receives
//! play/pause commands over a channel. Everything the device callback and
//! the host share (playing flag, volume, frames played) is atomic.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{AudioContext, AudioControls, AudioSink, AudioSource, Volume, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use crate::time_units::samples_to_duration;

/// The system's default output device at a fixed sample rate.
#[derive(Debug, Clone, Copy)]
pub struct CpalContext {
    sample_rate: u32,
}

impl CpalContext {
    /// Activates audio output at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        host.default_output_device()
            .ok_or_else(|| Error::Audio("No audio output device found".to_string()))?;
        Ok(Self { sample_rate })
    }
}

impl AudioContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn new_sink(
        &self,
        source: Box<dyn AudioSource>,
        channels: u16,
        buffer_hint: Duration,
    ) -> Result<Box<dyn AudioSink>> {
        let sink = CpalSink::spawn(source, channels, self.sample_rate, buffer_hint)?;
        Ok(Box::new(sink))
    }
}

/// Commands for the stream thread.
#[derive(Debug)]
enum SinkCommand {
    Play,
    Pause,
    Shutdown,
}

/// State shared between the device callback and the sink handle.
struct SharedState {
    volume_bits: AtomicU32,
    playing: AtomicBool,
    frames_played: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            volume_bits: AtomicU32::new(Volume::default().to_bits()),
            playing: AtomicBool::new(false),
            frames_played: AtomicU64::new(0),
        }
    }

    fn volume(&self) -> Volume {
        Volume::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

/// A playing (or paused) output stream.
pub struct CpalSink {
    command_tx: mpsc::UnboundedSender<SinkCommand>,
    shared: Arc<SharedState>,
    sample_rate: u32,
}

impl CpalSink {
    fn spawn(
        source: Box<dyn AudioSource>,
        channels: u16,
        sample_rate: u32,
        buffer_hint: Duration,
    ) -> Result<Self> {
        let shared = Arc::new(SharedState::new());
        let shared_for_thread = Arc::clone(&shared);
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<SinkCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        std::thread::Builder::new()
            .name("vidclock-audio".to_string())
            .spawn(move || {
                let stream = match open_stream(
                    source,
                    channels,
                    sample_rate,
                    buffer_hint,
                    Arc::clone(&shared_for_thread),
                ) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Some(command) = command_rx.blocking_recv() {
                    match command {
                        SinkCommand::Play => {
                            if let Err(err) = stream.play() {
                                tracing::warn!(%err, "failed to start audio stream");
                                shared_for_thread.playing.store(false, Ordering::SeqCst);
                            }
                        }
                        SinkCommand::Pause => {
                            if let Err(err) = stream.pause() {
                                tracing::warn!(%err, "failed to pause audio stream");
                            }
                        }
                        SinkCommand::Shutdown => break,
                    }
                }
                tracing::debug!("audio stream thread finished");
            })
            .map_err(|e| Error::Audio(format!("Failed to spawn audio thread: {e}")))?;

        ready_rx
            .blocking_recv()
            .map_err(|_| Error::Audio("Audio thread exited during setup".to_string()))??;

        Ok(Self {
            command_tx,
            shared,
            sample_rate,
        })
    }

    fn send(&self, command: SinkCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!("audio stream thread is not running");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SinkCommand::Shutdown);
    }
}

impl AudioControls for CpalSink {
    fn volume(&self) -> f64 {
        f64::from(self.shared.volume().value())
    }

    fn set_volume(&self, volume: f64) {
        self.shared
            .volume_bits
            .store(Volume::from_f64(volume).to_bits(), Ordering::Relaxed);
    }
}

impl AudioSink for CpalSink {
    fn play(&self) {
        self.shared.playing.store(true, Ordering::SeqCst);
        self.send(SinkCommand::Play);
    }

    fn pause(&self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.send(SinkCommand::Pause);
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    fn current(&self) -> Duration {
        samples_to_duration(
            self.shared.frames_played.load(Ordering::SeqCst),
            self.sample_rate,
        )
    }
}

/// Opens a paused output stream pulling from `source`.
fn open_stream(
    source: Box<dyn AudioSource>,
    channels: u16,
    sample_rate: u32,
    buffer_hint: Duration,
    shared: Arc<SharedState>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("No audio output device found".to_string()))?;
    let sample_format = device
        .default_output_config()
        .map_err(|e| Error::Audio(format!("Failed to get audio config: {e}")))?
        .sample_format();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let hint_frames = (buffer_hint.as_secs_f64() * f64::from(sample_rate)) as u32;
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Fixed(hint_frames),
    };

    let stream = match build_for_format(sample_format, &device, &config, source, &shared) {
        Ok(stream) => stream,
        Err((err, source)) => {
            tracing::debug!(%err, hint_frames, "fixed buffer rejected, using device default");
            let fallback = cpal::StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..config
            };
            build_for_format(sample_format, &device, &fallback, source, &shared)
                .map_err(|(err, _)| err)?
        }
    };

    // Streams may start running on creation with some hosts
    stream
        .pause()
        .map_err(|e| Error::Audio(format!("Failed to pause new audio stream: {e}")))?;
    Ok(stream)
}

/// Source handed back when building fails, so a retry can reuse it.
type BuildFailure = (Error, Box<dyn AudioSource>);

fn build_for_format(
    sample_format: cpal::SampleFormat,
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source: Box<dyn AudioSource>,
    shared: &Arc<SharedState>,
) -> std::result::Result<cpal::Stream, BuildFailure> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, source, shared),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, source, shared),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, source, shared),
        other => Err((
            Error::Audio(format!("Unsupported audio sample format: {other:?}")),
            source,
        )),
    }
}

/// Builds an output stream for a specific device sample format.
///
/// The source is shared with the callback through a slot so that it can be
/// recovered if the backend rejects the configuration.
fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source: Box<dyn AudioSource>,
    shared: &Arc<SharedState>,
) -> std::result::Result<cpal::Stream, BuildFailure> {
    let slot = Arc::new(std::sync::Mutex::new(Some(source)));
    let callback_slot = Arc::clone(&slot);
    let callback_shared = Arc::clone(shared);
    let channels = usize::from(config.channels.max(1));
    let mut scratch: Vec<u8> = Vec::new();

    let result = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let silence = T::from_sample(0.0f32);
            if !callback_shared.playing.load(Ordering::SeqCst) {
                data.fill(silence);
                return;
            }
            let Ok(mut guard) = callback_slot.lock() else {
                data.fill(silence);
                return;
            };
            let Some(source) = guard.as_mut() else {
                data.fill(silence);
                return;
            };

            scratch.resize(data.len() * BYTES_PER_SAMPLE, 0);
            let pull = source.pull(&mut scratch);
            let samples = pull.written / BYTES_PER_SAMPLE;
            let volume = callback_shared.volume();
            let gain = if volume.is_muted() { 0.0 } else { volume.value() };

            for (i, out) in data.iter_mut().enumerate() {
                if i < samples {
                    let raw = i16::from_le_bytes([
                        scratch[i * BYTES_PER_SAMPLE],
                        scratch[i * BYTES_PER_SAMPLE + 1],
                    ]);
                    let value = f32::from(raw) / 32_768.0 * gain;
                    *out = T::from_sample(value.clamp(-1.0, 0.999_999_9));
                } else {
                    *out = silence;
                }
            }

            callback_shared
                .frames_played
                .fetch_add((samples / channels) as u64, Ordering::SeqCst);
            if pull.ended {
                callback_shared.playing.store(false, Ordering::SeqCst);
            }
        },
        |err| {
            tracing::warn!(%err, "audio output error");
        },
        None,
    );

    match result {
        Ok(stream) => Ok(stream),
        Err(e) => {
            let source = slot
                .lock()
                .ok()
                .and_then(|mut guard| guard.take());
            match source {
                Some(source) => Err((
                    Error::Audio(format!("Failed to build audio stream: {e}")),
                    source,
                )),
                // The callback closure owned the last reference; nothing to retry with
                None => Err((
                    Error::Audio(format!("Failed to build audio stream: {e}")),
                    Box::new(Exhausted),
                )),
            }
        }
    }
}

/// Placeholder source that reports end of stream immediately.
struct Exhausted;

impl AudioSource for Exhausted {
    fn pull(&mut self, _dest: &mut [u8]) -> super::Pull {
        super::Pull {
            written: 0,
            ended: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_state_volume_round_trips() {
        let state = SharedState::new();
        assert!((state.volume().value() - 1.0).abs() < 0.001);
        state
            .volume_bits
            .store(Volume::new(0.5).to_bits(), Ordering::Relaxed);
        assert!((state.volume().value() - 0.5).abs() < 0.001);
    }

    #[test]
    fn sink_command_debug() {
        let debug_str = format!("{:?}", SinkCommand::Pause);
        assert!(debug_str.contains("Pause"));
    }

    // Creating a CpalContext requires actual audio hardware, which is
    // better suited for manual testing.
    #[test]
    #[ignore = "requires audio hardware"]
    fn cpal_context_can_be_created() {
        if let Ok(context) = CpalContext::new(44_100) {
            assert_eq!(context.sample_rate(), 44_100);
        }
    }
}
