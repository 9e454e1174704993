// SPDX-License-Identifier: MPL-2.0
//! Playback position authority.
//!
//! A controller answers "where is playback now?" and applies the commands
//! that move it. It owns the decoder, so position and decode cursor change
//! together under one lock.
//!
//! Two variants exist:
//! - [`VideoOnlyController`]: position runs on the wall clock.
//! - [`AudioDrivenController`]: position follows the audio backend's clock,
//!   which is the clock the listener actually hears.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ play/pause/seek ┌────────────┐  lock  ┌──────────────┐
//! │  Player  │────────────────▶│ Controller │───────▶│ MediaDecoder │
//! └──────────┘                 └────────────┘        └──────────────┘
//!                                    ▲                      ▲
//!                       current()    │                      │ decode_audio
//!                              ┌───────────┐  pull   ┌───────────┐
//!                              │ AudioSink │────────▶│ AudioFeed │
//!                              └───────────┘         └───────────┘
//! ```

mod audio_driven;
mod video_only;

pub use audio_driven::{AudioDrivenController, AudioFeed};
pub use video_only::VideoOnlyController;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::MutexGuard;
use std::time::Duration;

use crate::audio::AudioControls;
use crate::decoder::{MediaDecoder, VideoFrame};

/// Position authority shared by both controller variants.
///
/// Every method takes the session lock for its whole duration.
pub trait Controller<D: MediaDecoder>: Send + Sync {
    /// Starts playback. Does nothing if already playing or at end of stream.
    fn play(&self);

    fn is_playing(&self) -> bool;

    /// Stops playback, freezing the position.
    fn pause(&self);

    /// Moves the decoder and the position back to the start, returning the
    /// first frame.
    ///
    /// The first frame is decoded under the same lock as the rewind. The
    /// playing state is unchanged.
    fn rewind(&self) -> Option<VideoFrame>;

    /// Seeks the decoder and re-anchors the position to `target`.
    ///
    /// Returns `None`, leaving everything unchanged, if the decoder could
    /// not seek.
    fn seek_frame(&self, target: Duration, precise: bool) -> Option<VideoFrame>;

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Locks the session for direct decoder access.
    ///
    /// Other controller calls on this thread deadlock while the guard lives.
    fn lock(&self) -> DecoderGuard<'_, D>;

    /// Volume control, present only when the stream plays audio.
    fn audio(&self) -> Option<&dyn AudioControls> {
        None
    }

    /// Moves the position back by `period` without touching the decoder.
    ///
    /// Used when a looping decoder wraps around to the start.
    fn wrap_back(&self, period: Duration);
}

/// Exclusive access to the decoder for as long as the guard lives.
pub struct DecoderGuard<'a, D> {
    session: SessionGuard<'a, D>,
}

enum SessionGuard<'a, D> {
    AudioDriven(MutexGuard<'a, audio_driven::Session<D>>),
    VideoOnly(MutexGuard<'a, video_only::Session<D>>),
}

impl<'a, D> DecoderGuard<'a, D> {
    fn audio_driven(session: MutexGuard<'a, audio_driven::Session<D>>) -> Self {
        Self {
            session: SessionGuard::AudioDriven(session),
        }
    }

    fn video_only(session: MutexGuard<'a, video_only::Session<D>>) -> Self {
        Self {
            session: SessionGuard::VideoOnly(session),
        }
    }
}

impl<D> Deref for DecoderGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        match &self.session {
            SessionGuard::AudioDriven(session) => &session.decoder,
            SessionGuard::VideoOnly(session) => &session.decoder,
        }
    }
}

impl<D> DerefMut for DecoderGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        match &mut self.session {
            SessionGuard::AudioDriven(session) => &mut session.decoder,
            SessionGuard::VideoOnly(session) => &mut session.decoder,
        }
    }
}

impl<D> fmt::Debug for DecoderGuard<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self.session {
            SessionGuard::AudioDriven(_) => "audio-driven",
            SessionGuard::VideoOnly(_) => "video-only",
        };
        f.debug_struct("DecoderGuard")
            .field("controller", &variant)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SimulatedContext;
    use crate::clock::ManualClock;
    use crate::config::PlayerConfig;
    use crate::decoder::{SyntheticDecoder, SyntheticStream};
    use std::sync::Arc;

    fn stream() -> SyntheticStream {
        SyntheticStream::new(2, 2, 30.0, Duration::from_secs(2))
    }

    fn controllers() -> Vec<Box<dyn Controller<SyntheticDecoder>>> {
        let context = SimulatedContext::new(48_000);
        let audio = AudioDrivenController::new(
            SyntheticDecoder::new(stream().with_audio(1, 48_000)),
            Some(&context),
            &PlayerConfig::default(),
            Arc::new(ManualClock::new()),
        )
        .expect("valid audio stream");
        let video = VideoOnlyController::new(
            SyntheticDecoder::new(stream()),
            Arc::new(ManualClock::new()),
        );
        vec![Box::new(audio), Box::new(video)]
    }

    #[test]
    fn guard_changes_reach_the_session_decoder() {
        for controller in controllers() {
            {
                let mut decoder = controller.lock();
                decoder.set_looping(true);
                decoder.decode_video();
            }
            let decoder = controller.lock();
            assert!(decoder.is_looping());
            assert_eq!(decoder.frames_decoded(), 1);
        }
    }

    #[test]
    fn guard_debug_names_controller() {
        let controllers = controllers();
        assert!(format!("{:?}", controllers[0].lock()).contains("audio-driven"));
        assert!(format!("{:?}", controllers[1].lock()).contains("video-only"));
    }

    #[test]
    fn rewind_returns_first_frame() {
        for controller in controllers() {
            {
                let mut decoder = controller.lock();
                for _ in 0..20 {
                    decoder.decode_video();
                }
            }
            let first = controller.rewind().expect("stream has frames");
            assert!(first.time_secs.abs() < f64::EPSILON);
            assert_eq!(SyntheticDecoder::frame_index_of(&first.rgba), Some(0));
            assert!(controller.lock().video_time().abs() < f64::EPSILON);
        }
    }
}
