// SPDX-License-Identifier: MPL-2.0
//! The player façade.
//!
//! A [`Player`] wires a decoder to a position authority and a frame buffer.
//! Hosts call [`Player::current_frame`] once per redraw; everything else is
//! a command or a metadata query.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vidclock::config::PlayerConfig;
//! use vidclock::decoder::{SyntheticDecoder, SyntheticStream};
//! use vidclock::player::Player;
//!
//! let stream = SyntheticStream::new(64, 36, 30.0, Duration::from_secs(2));
//! let mut player = Player::open(SyntheticDecoder::new(stream), None, &PlayerConfig::default())
//!     .expect("video-only streams need no audio context");
//!
//! player.play();
//! let frame = player.current_frame();
//! assert_eq!(frame.dimensions(), (64, 36));
//! ```

use std::sync::Arc;
use std::time::Duration;

use image_rs::RgbaImage;

use crate::audio::AudioContext;
use crate::clock::{SharedWallClock, SystemClock};
use crate::config::PlayerConfig;
use crate::controller::{
    AudioDrivenController, Controller, DecoderGuard, VideoOnlyController,
};
use crate::decoder::MediaDecoder;
use crate::error::{Error, Result};
use crate::stepper::FrameStepper;

/// Plays one stream.
pub struct Player<D: MediaDecoder + 'static> {
    controller: Box<dyn Controller<D>>,
    stepper: FrameStepper,
}

impl<D: MediaDecoder + 'static> Player<D> {
    /// Opens a player over `decoder`.
    ///
    /// Streams with audio need an `audio_context` running at the stream's
    /// sample rate. The frame buffer starts black.
    ///
    /// # Errors
    ///
    /// In order of checking: [`Error::NoVideoStream`], [`Error::MissingHeaders`],
    /// then for streams with audio [`Error::NoAudioContext`],
    /// [`Error::TooManyChannels`] and [`Error::SampleRateMismatch`].
    pub fn open(
        decoder: D,
        audio_context: Option<&dyn AudioContext>,
        config: &PlayerConfig,
    ) -> Result<Self> {
        Self::open_with_clock(decoder, audio_context, config, Arc::new(SystemClock))
    }

    /// Like [`Player::open`], reading "now" from `clock`.
    ///
    /// # Errors
    ///
    /// See [`Player::open`].
    pub fn open_with_clock(
        mut decoder: D,
        audio_context: Option<&dyn AudioContext>,
        config: &PlayerConfig,
        clock: SharedWallClock,
    ) -> Result<Self> {
        let info = decoder.info();
        if info.video_streams == 0 {
            return Err(Error::NoVideoStream);
        }
        if !info.has_headers {
            return Err(Error::MissingHeaders);
        }
        decoder.set_looping(config.looping);

        let controller: Box<dyn Controller<D>> = if info.audio_streams > 0 {
            Box::new(AudioDrivenController::new(
                decoder,
                audio_context,
                config,
                clock,
            )?)
        } else {
            Box::new(VideoOnlyController::new(decoder, clock))
        };

        let stepper = FrameStepper::new(
            info.width,
            info.height,
            info.framerate,
            config.sync_correction_secs(),
            config.catch_up_policy(),
        );

        tracing::debug!(
            width = info.width,
            height = info.height,
            framerate = info.framerate,
            duration = ?info.duration,
            has_audio = info.audio_streams > 0,
            "player opened"
        );

        Ok(Self {
            controller,
            stepper,
        })
    }

    /// Starts the playback clock, and the audio if any.
    ///
    /// Frames still have to be fetched with [`Player::current_frame`].
    pub fn play(&self) {
        self.controller.play();
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    /// Goes back to the start and shows the first frame.
    pub fn rewind(&mut self) {
        let first = self.controller.rewind();
        self.stepper.show(first.as_ref());
    }

    /// Seeks to the intra frame at or before `position`.
    ///
    /// Faster than [`Player::seek_precise`], but the frame shown may be
    /// up to one intra interval early. Returns whether the seek succeeded.
    pub fn seek_fast(&mut self, position: Duration) -> bool {
        self.stepper.seek(self.controller.as_ref(), position, false)
    }

    /// Seeks to the frame at `position`, decoding forward from the
    /// preceding intra frame.
    pub fn seek_precise(&mut self, position: Duration) -> bool {
        self.stepper.seek(self.controller.as_ref(), position, true)
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.controller.position()
    }

    /// The frame at the current position.
    ///
    /// The image is reused: the next call may overwrite it.
    pub fn current_frame(&mut self) -> &RgbaImage {
        if self.wrap_looped_position() {
            self.stepper.mark_wrapped();
        }
        self.stepper.current_frame(self.controller.as_ref())
    }

    #[must_use]
    pub fn resolution(&self) -> (u32, u32) {
        let info = self.controller.lock().info();
        (info.width, info.height)
    }

    #[must_use]
    pub fn frame_rate(&self) -> f64 {
        self.controller.lock().info().framerate
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.controller.lock().info().duration
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.controller.audio().is_some()
    }

    /// Audio volume, or 0 for streams without audio.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.controller
            .audio()
            .map_or(0.0, |audio| audio.volume())
    }

    /// Sets the audio volume, clamped to `0.0..=1.0`.
    ///
    /// # Panics
    ///
    /// Panics if the stream has no audio.
    pub fn set_volume(&self, volume: f64) {
        match self.controller.audio() {
            Some(audio) => audio.set_volume(volume),
            None => panic!("attempted to set volume on a video with no audio"),
        }
    }

    /// Direct decoder access. Other player calls deadlock while the guard
    /// is alive.
    pub fn lock(&self) -> DecoderGuard<'_, D> {
        self.controller.lock()
    }

    pub fn set_looping(&self, looping: bool) {
        self.controller.lock().set_looping(looping);
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.controller.lock().is_looping()
    }

    /// Brings the position back inside the stream after a looping decoder
    /// went past the end. Returns whether it moved.
    fn wrap_looped_position(&self) -> bool {
        let duration = {
            let decoder = self.controller.lock();
            if !decoder.is_looping() {
                return false;
            }
            decoder.info().duration
        };
        if duration.is_zero() {
            return false;
        }

        let position = self.controller.position();
        if position < duration {
            return false;
        }
        let laps = position.as_nanos() / duration.as_nanos();
        let period = duration.saturating_mul(u32::try_from(laps).unwrap_or(u32::MAX));
        tracing::debug!(?position, laps, "looping back");
        self.controller.wrap_back(period);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SimulatedContext;
    use crate::decoder::{SyntheticDecoder, SyntheticStream};

    fn stream() -> SyntheticStream {
        SyntheticStream::new(8, 4, 25.0, Duration::from_secs(4))
    }

    fn open(
        stream: SyntheticStream,
        context: Option<&dyn AudioContext>,
    ) -> Result<Player<SyntheticDecoder>> {
        Player::open(SyntheticDecoder::new(stream), context, &PlayerConfig::default())
    }

    #[test]
    fn rejects_stream_without_video() {
        let result = open(stream().without_video().with_audio(1, 44_100), None);
        assert_eq!(result.err(), Some(Error::NoVideoStream));
    }

    #[test]
    fn rejects_stream_without_headers() {
        let result = open(stream().without_headers(), None);
        assert_eq!(result.err(), Some(Error::MissingHeaders));
    }

    #[test]
    fn video_check_precedes_header_check() {
        let result = open(stream().without_video().without_headers(), None);
        assert_eq!(result.err(), Some(Error::NoVideoStream));
    }

    #[test]
    fn audio_stream_requires_context() {
        let result = open(stream().with_audio(2, 44_100), None);
        assert_eq!(result.err(), Some(Error::NoAudioContext));
    }

    #[test]
    fn video_only_stream_has_no_audio() {
        let player = open(stream(), None).expect("valid stream");
        assert!(!player.has_audio());
        assert!(player.volume().abs() < f64::EPSILON);
    }

    #[test]
    fn metadata_comes_from_decoder() {
        let player = open(stream(), None).expect("valid stream");
        assert_eq!(player.resolution(), (8, 4));
        assert!((player.frame_rate() - 25.0).abs() < f64::EPSILON);
        assert_eq!(player.duration(), Duration::from_secs(4));
    }

    #[test]
    fn starts_black_and_paused() {
        let mut player = open(stream(), None).expect("valid stream");
        assert!(!player.is_playing());
        assert_eq!(
            SyntheticDecoder::frame_index_of(player.current_frame().as_raw()),
            None
        );
    }

    #[test]
    fn audio_stream_exposes_volume() {
        let context = SimulatedContext::new(44_100);
        let player = open(stream().with_audio(2, 44_100), Some(&context)).expect("valid stream");
        assert!(player.has_audio());
        assert!((player.volume() - 1.0).abs() < 1e-6);
        player.set_volume(0.4);
        assert!((player.volume() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn config_sets_looping_and_volume() {
        let config = PlayerConfig {
            looping: true,
            initial_volume: 0.5,
            ..PlayerConfig::default()
        };
        let context = SimulatedContext::new(44_100);
        let player = Player::open(
            SyntheticDecoder::new(stream().with_audio(1, 44_100)),
            Some(&context),
            &config,
        )
        .expect("valid stream");
        assert!(player.is_looping());
        assert!((player.volume() - 0.5).abs() < 1e-6);

        player.set_looping(false);
        assert!(!player.lock().is_looping());
    }

    #[test]
    #[should_panic(expected = "no audio")]
    fn set_volume_without_audio_panics() {
        let player = open(stream(), None).expect("valid stream");
        player.set_volume(0.5);
    }
}
