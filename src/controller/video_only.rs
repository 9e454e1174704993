// SPDX-License-Identifier: MPL-2.0
//! Wall-clock position authority for streams without audio.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Controller, DecoderGuard};
use crate::clock::SharedWallClock;
use crate::decoder::{MediaDecoder, VideoFrame};

pub(super) struct Session<D> {
    pub(super) decoder: D,
    playing: bool,
    /// Wall-clock instant at which `reference_position` was reached.
    reference_time: Instant,
    reference_position: Duration,
}

impl<D> Session<D> {
    fn position_at(&self, now: Instant) -> Duration {
        if self.playing {
            self.reference_position + now.saturating_duration_since(self.reference_time)
        } else {
            self.reference_position
        }
    }

    fn anchor(&mut self, position: Duration, now: Instant) {
        self.reference_position = position;
        self.reference_time = now;
    }
}

/// Controller whose position runs on the wall clock.
pub struct VideoOnlyController<D> {
    session: Mutex<Session<D>>,
    clock: SharedWallClock,
}

impl<D: MediaDecoder> VideoOnlyController<D> {
    pub fn new(decoder: D, clock: SharedWallClock) -> Self {
        let now = clock.now();
        Self {
            session: Mutex::new(Session {
                decoder,
                playing: false,
                reference_time: now,
                reference_position: Duration::ZERO,
            }),
            clock,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session<D>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: MediaDecoder> Controller<D> for VideoOnlyController<D> {
    fn play(&self) {
        let mut session = self.session();
        if session.playing || session.decoder.has_ended() {
            return;
        }
        let now = self.clock.now();
        let position = session.reference_position;
        session.anchor(position, now);
        session.playing = true;
        tracing::debug!(?position, "video-only playback started");
    }

    fn is_playing(&self) -> bool {
        self.session().playing
    }

    fn pause(&self) {
        let mut session = self.session();
        if !session.playing {
            return;
        }
        let now = self.clock.now();
        let position = session.position_at(now);
        session.anchor(position, now);
        session.playing = false;
        tracing::debug!(?position, "video-only playback paused");
    }

    fn rewind(&self) -> Option<VideoFrame> {
        let mut session = self.session();
        session.decoder.rewind();
        let first = session.decoder.decode_video();
        session.anchor(Duration::ZERO, self.clock.now());
        tracing::debug!("video-only playback rewound");
        first
    }

    fn seek_frame(&self, target: Duration, precise: bool) -> Option<VideoFrame> {
        let mut session = self.session();
        let frame = session.decoder.seek_frame(target, precise)?;
        session.anchor(target, self.clock.now());
        tracing::debug!(?target, precise, "video-only seek");
        Some(frame)
    }

    fn position(&self) -> Duration {
        self.session().position_at(self.clock.now())
    }

    fn lock(&self) -> DecoderGuard<'_, D> {
        DecoderGuard::video_only(self.session())
    }

    fn wrap_back(&self, period: Duration) {
        let mut session = self.session();
        let now = self.clock.now();
        let position = session.position_at(now).saturating_sub(period);
        session.anchor(position, now);
        tracing::debug!(?position, "video-only position wrapped");
    }
}
