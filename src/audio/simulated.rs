// SPDX-License-Identifier: MPL-2.0
//! Headless audio backend.
//!
//! Nothing plays on its own: the owner calls [`SimulatedSink::pump`] to
//! consume audio as a device callback would. The reported clock only moves
//! in multiples of a configurable quantum, which reproduces the coarse,
//! sticky position readout of real backends.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{AudioContext, AudioControls, AudioSink, AudioSource, Volume, BYTES_PER_SAMPLE};
use crate::error::Result;
use crate::time_units::samples_to_duration;

/// Audio context backed by [`SimulatedSink`]s.
pub struct SimulatedContext {
    sample_rate: u32,
    quantum: Duration,
    sinks: Mutex<Vec<SimulatedSink>>,
}

impl SimulatedContext {
    /// A context whose sinks report their clock with full precision.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self::with_quantum(sample_rate, Duration::ZERO)
    }

    /// A context whose sinks round their clock down to `quantum`.
    #[must_use]
    pub fn with_quantum(sample_rate: u32, quantum: Duration) -> Self {
        Self {
            sample_rate,
            quantum,
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// The most recently created sink.
    #[must_use]
    pub fn last_sink(&self) -> Option<SimulatedSink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl AudioContext for SimulatedContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn new_sink(
        &self,
        source: Box<dyn AudioSource>,
        channels: u16,
        _buffer_hint: Duration,
    ) -> Result<Box<dyn AudioSink>> {
        let sink = SimulatedSink {
            inner: Arc::new(Inner {
                source: Mutex::new(source),
                state: Mutex::new(State::default()),
                channels: channels.max(1),
                sample_rate: self.sample_rate,
                quantum: self.quantum,
            }),
        };
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink.clone());
        Ok(Box::new(sink))
    }
}

struct Inner {
    source: Mutex<Box<dyn AudioSource>>,
    state: Mutex<State>,
    channels: u16,
    sample_rate: u32,
    quantum: Duration,
}

#[derive(Default)]
struct State {
    playing: bool,
    frames_played: u64,
    bytes_pulled: usize,
    ended: bool,
    volume: Volume,
}

/// Handle to a simulated output. Clones share the same output.
#[derive(Clone)]
pub struct SimulatedSink {
    inner: Arc<Inner>,
}

impl SimulatedSink {
    /// Consumes `duration` worth of audio from the source if playing.
    ///
    /// Returns the number of bytes pulled.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pump(&self, duration: Duration) -> usize {
        if !self.is_playing() {
            return 0;
        }
        let frames = (duration.as_secs_f64() * f64::from(self.inner.sample_rate)).round() as usize;
        let frame_bytes = usize::from(self.inner.channels) * BYTES_PER_SAMPLE;
        let mut buffer = vec![0u8; frames * frame_bytes];

        let pull = self
            .inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pull(&mut buffer);

        let mut state = self.state();
        state.frames_played += (pull.written / frame_bytes) as u64;
        state.bytes_pulled += pull.written;
        if pull.ended {
            state.ended = true;
            state.playing = false;
        }
        pull.written
    }

    /// Moves the clock forward without consuming audio.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn advance_clock(&self, duration: Duration) {
        let frames = (duration.as_secs_f64() * f64::from(self.inner.sample_rate)).round() as u64;
        self.state().frames_played += frames;
    }

    /// Total bytes pulled from the source.
    #[must_use]
    pub fn bytes_pulled(&self) -> usize {
        self.state().bytes_pulled
    }

    /// Whether the source reported end of stream.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        self.state().ended
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioControls for SimulatedSink {
    fn volume(&self) -> f64 {
        f64::from(self.state().volume.value())
    }

    fn set_volume(&self, volume: f64) {
        self.state().volume = Volume::from_f64(volume);
    }
}

impl AudioSink for SimulatedSink {
    fn play(&self) {
        self.state().playing = true;
    }

    fn pause(&self) {
        self.state().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state().playing
    }

    fn current(&self) -> Duration {
        let played = samples_to_duration(self.state().frames_played, self.inner.sample_rate);
        if self.inner.quantum.is_zero() {
            return played;
        }
        let steps = played.as_nanos() / self.inner.quantum.as_nanos();
        self.inner.quantum * u32::try_from(steps).unwrap_or(u32::MAX)
    }
}
