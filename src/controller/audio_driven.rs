// SPDX-License-Identifier: MPL-2.0
//! Audio-clock position authority.
//!
//! The audio backend pulls decoded samples through [`AudioFeed`] and counts
//! what it has played. That count is the position, with two corrections:
//!
//! - Backends report their clock in coarse steps. While the raw reading
//!   stays the same, up to `clock_smoothing_cap` of wall time is added so
//!   that frames keep advancing between ticks.
//! - The backend clock can't be reset. Seeks and rewinds record a signed
//!   [`Offset`] between the backend clock and the stream position instead.
//!
//! While paused the position captured at pause time is held as is. Once the
//! backend has drained the stream it stops itself; the next controller call
//! notices and holds the final position the same way.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Controller, DecoderGuard};
use crate::audio::{
    extend_samples_le, write_samples_le, AudioContext, AudioControls, AudioSink, AudioSource,
    Pull, BYTES_PER_SAMPLE,
};
use crate::clock::{Offset, SharedWallClock, StickySmoother};
use crate::config::{PlayerConfig, MAX_AUDIO_CHANNELS};
use crate::decoder::{MediaDecoder, VideoFrame};
use crate::error::{Error, Result};

pub(super) struct Session<D> {
    pub(super) decoder: D,
    playing: bool,
    /// Set when a pull reported end of stream, which stops the backend.
    drained: bool,
    compensation: Offset,
    smoother: StickySmoother,
    /// Position returned while paused.
    held: Duration,
    /// Decoded bytes that did not fit the previous pull.
    leftovers: Vec<u8>,
}

impl<D: MediaDecoder> Session<D> {
    fn position_at(&mut self, raw: Duration, now: Instant) -> Duration {
        if !self.playing {
            return self.held;
        }
        let smoothed = self.smoother.smooth(raw, now);
        self.compensation.apply(smoothed)
    }

    /// Stops playback if the backend stopped itself at end of stream.
    fn settle(&mut self, raw: Duration, now: Instant) {
        if !self.drained {
            return;
        }
        self.drained = false;
        if self.playing {
            self.held = self.position_at(raw, now);
            self.playing = false;
            tracing::debug!(position = ?self.held, "audio playback reached end of stream");
        }
    }

    /// Makes the backend reading `raw` correspond to `position`.
    fn anchor(&mut self, raw: Duration, position: Duration, now: Instant) {
        self.compensation = Offset::between(raw, position);
        self.smoother.observe(raw, now);
        self.held = position;
    }

    fn fill(&mut self, dest: &mut [u8]) -> Pull {
        if dest.is_empty() {
            let ended = self.decoder.has_audio_ended();
            self.drained |= ended;
            return Pull { written: 0, ended };
        }

        let mut written = self.leftovers.len().min(dest.len());
        dest[..written].copy_from_slice(&self.leftovers[..written]);
        self.leftovers.drain(..written);

        while written < dest.len() {
            let Some(chunk) = self.decoder.decode_audio() else {
                break;
            };
            let fitted = write_samples_le(&chunk.samples, &mut dest[written..]);
            written += fitted * BYTES_PER_SAMPLE;
            if fitted < chunk.samples.len() {
                extend_samples_le(&chunk.samples[fitted..], &mut self.leftovers);
                break;
            }
        }

        let ended = written == 0 && self.leftovers.is_empty() && self.decoder.has_audio_ended();
        self.drained |= ended;
        Pull { written, ended }
    }
}

type SharedSession<D> = Arc<Mutex<Session<D>>>;

fn lock_session<D>(session: &SharedSession<D>) -> MutexGuard<'_, Session<D>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The byte stream an audio backend pulls from.
///
/// Serves interleaved S16LE samples decoded on demand. Each pull holds the
/// session lock, so decoding never races a seek.
pub struct AudioFeed<D> {
    session: SharedSession<D>,
}

impl<D: MediaDecoder> AudioSource for AudioFeed<D> {
    fn pull(&mut self, dest: &mut [u8]) -> Pull {
        lock_session(&self.session).fill(dest)
    }
}

/// Controller whose position follows the audio backend's clock.
pub struct AudioDrivenController<D> {
    session: SharedSession<D>,
    sink: Box<dyn AudioSink>,
    clock: SharedWallClock,
}

impl<D: MediaDecoder + 'static> AudioDrivenController<D> {
    /// Opens an audio sink fed by `decoder`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoAudioContext`] if `context` is `None`.
    /// - [`Error::TooManyChannels`] for streams with more than two channels.
    /// - [`Error::SampleRateMismatch`] if the context runs at another rate.
    /// - Any error the backend reports while opening the sink.
    pub fn new(
        decoder: D,
        context: Option<&dyn AudioContext>,
        config: &PlayerConfig,
        clock: SharedWallClock,
    ) -> Result<Self> {
        let context = context.ok_or(Error::NoAudioContext)?;
        let info = decoder.info();
        if info.channels > MAX_AUDIO_CHANNELS {
            return Err(Error::TooManyChannels(info.channels));
        }
        if context.sample_rate() != info.sample_rate {
            return Err(Error::SampleRateMismatch {
                stream: info.sample_rate,
                output: context.sample_rate(),
            });
        }

        let now = clock.now();
        let session = Arc::new(Mutex::new(Session {
            decoder,
            playing: false,
            drained: false,
            compensation: Offset::default(),
            smoother: StickySmoother::new(config.clock_smoothing_cap(), now),
            held: Duration::ZERO,
            leftovers: Vec::new(),
        }));
        let feed = AudioFeed {
            session: Arc::clone(&session),
        };
        let sink = context.new_sink(Box::new(feed), info.channels, config.audio_buffer())?;
        sink.set_volume(f64::from(config.initial_volume));

        tracing::debug!(
            channels = info.channels,
            sample_rate = info.sample_rate,
            "audio sink opened"
        );

        Ok(Self {
            session,
            sink,
            clock,
        })
    }
}

impl<D: MediaDecoder> AudioDrivenController<D> {
    /// Locks the session, first catching up with a backend that stopped
    /// itself at end of stream.
    fn session(&self) -> MutexGuard<'_, Session<D>> {
        let mut session = lock_session(&self.session);
        if session.drained {
            let raw = self.sink.current();
            session.settle(raw, self.clock.now());
        }
        session
    }
}

impl<D: MediaDecoder> Controller<D> for AudioDrivenController<D> {
    fn play(&self) {
        {
            let mut session = self.session();
            if session.playing || session.decoder.has_ended() {
                return;
            }
            let raw = self.sink.current();
            let position = session.held;
            session.anchor(raw, position, self.clock.now());
            session.playing = true;
            tracing::debug!(?position, "audio playback started");
        }
        // The sink may pull right away, which takes the session lock
        self.sink.play();
    }

    fn is_playing(&self) -> bool {
        self.session().playing
    }

    fn pause(&self) {
        {
            let mut session = self.session();
            if session.playing {
                let raw = self.sink.current();
                let position = session.position_at(raw, self.clock.now());
                session.held = position;
                session.playing = false;
                tracing::debug!(?position, "audio playback paused");
            }
        }
        self.sink.pause();
    }

    fn rewind(&self) -> Option<VideoFrame> {
        let mut session = self.session();
        session.decoder.rewind();
        let first = session.decoder.decode_video();
        session.leftovers.clear();
        let raw = self.sink.current();
        session.anchor(raw, Duration::ZERO, self.clock.now());
        tracing::debug!("audio playback rewound");
        first
    }

    fn seek_frame(&self, target: Duration, precise: bool) -> Option<VideoFrame> {
        let mut session = self.session();
        let frame = session.decoder.seek_frame(target, precise)?;
        session.leftovers.clear();
        let raw = self.sink.current();
        session.anchor(raw, target, self.clock.now());
        tracing::debug!(?target, precise, "audio seek");
        Some(frame)
    }

    fn position(&self) -> Duration {
        let mut session = self.session();
        let raw = self.sink.current();
        session.position_at(raw, self.clock.now())
    }

    fn lock(&self) -> DecoderGuard<'_, D> {
        DecoderGuard::audio_driven(lock_session(&self.session))
    }

    fn audio(&self) -> Option<&dyn AudioControls> {
        Some(self.sink.as_ref())
    }

    fn wrap_back(&self, period: Duration) {
        let mut session = self.session();
        session.compensation.push_back(period);
        session.held = session.held.saturating_sub(period);
        tracing::debug!(?period, "audio position wrapped");
    }
}
