// SPDX-License-Identifier: MPL-2.0
//! Frame stepping: bringing the decode cursor up to the playback position.
//!
//! The decoder only knows how far it has decoded. On each frame query the
//! stepper compares that with the controller's position and decodes forward
//! until the next frame would be in the future. Queries that arrive faster
//! than the framerate cost nothing: the buffer already holds the right frame.

use std::time::Duration;

use image_rs::RgbaImage;

use crate::controller::Controller;
use crate::decoder::{MediaDecoder, VideoFrame};
use crate::frame_buffer::FrameBuffer;
use crate::time_units::{duration_to_secs, frame_duration_secs, frames_between, secs_to_duration};

/// What the stepper does when the position is far ahead of the decoder.
///
/// By default every intervening frame is decoded, which keeps output exact
/// but can take long after a stall. With a threshold, gaps larger than that
/// many frames first jump to the intra frame before the position and step
/// from there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpPolicy {
    pub seek_threshold_frames: Option<u32>,
}

/// Owns the frame buffer and keeps it in step with a controller.
#[derive(Debug, Clone)]
pub struct FrameStepper {
    buffer: FrameBuffer,
    framerate: f64,
    sync_correction_secs: f64,
    policy: CatchUpPolicy,
    /// The position went back a lap since the last frame query.
    position_wrapped: bool,
}

impl FrameStepper {
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        framerate: f64,
        sync_correction_secs: f64,
        policy: CatchUpPolicy,
    ) -> Self {
        Self {
            buffer: FrameBuffer::new(width, height),
            framerate,
            sync_correction_secs,
            policy,
            position_wrapped: false,
        }
    }

    /// Records that the position was moved back to the start of a loop.
    ///
    /// On the next frame query a decoder still at the end of the stream is
    /// run to its loop point instead of holding its last frame.
    pub fn mark_wrapped(&mut self) {
        self.position_wrapped = true;
    }

    /// The frame currently in the buffer, without stepping.
    #[must_use]
    pub fn frame(&self) -> &RgbaImage {
        self.buffer.image()
    }

    #[must_use]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Decodes up to the controller's position and returns the buffer.
    pub fn current_frame<D: MediaDecoder>(&mut self, controller: &dyn Controller<D>) -> &RgbaImage {
        let target = duration_to_secs(controller.position()) + self.sync_correction_secs;
        let position_wrapped = std::mem::take(&mut self.position_wrapped);
        let mut decoder = controller.lock();

        if decoder.has_video_ended() {
            self.buffer.copy_frame(None);
            return self.buffer.image();
        }

        let frame_duration = frame_duration_secs(self.framerate);
        let mut last: Option<VideoFrame> = None;
        if position_wrapped
            && decoder.is_looping()
            && decoder.video_time() > target + frame_duration
        {
            // The position wrapped before the decoder did
            last = run_to_wrap(&mut *decoder);
        }
        if last.is_none() && decoder.video_time() + frame_duration >= target {
            return self.buffer.image();
        }

        if let Some(threshold) = self.policy.seek_threshold_frames {
            let gap = frames_between(decoder.video_time(), target, self.framerate);
            if gap > u64::from(threshold) {
                tracing::trace!(gap, threshold, "seeking ahead of catch-up");
                last = decoder.seek_frame(secs_to_duration(target), false);
            }
        }

        let mut steps = 0u32;
        while decoder.video_time() + frame_duration < target {
            let before = decoder.video_time();
            let Some(frame) = decoder.decode_video() else {
                break;
            };
            steps += 1;
            let wrapped = frame.time_secs < before;
            last = Some(frame);
            if wrapped || decoder.has_video_ended() {
                break;
            }
        }
        tracing::trace!(steps, target, "caught up");

        self.buffer.copy_frame(last.as_ref());
        self.buffer.image()
    }

    /// Seeks the controller and shows the frame it landed on.
    ///
    /// Returns whether the seek succeeded. A failed seek blanks the buffer.
    pub fn seek<D: MediaDecoder>(
        &mut self,
        controller: &dyn Controller<D>,
        position: Duration,
        precise: bool,
    ) -> bool {
        let frame = controller.seek_frame(position, precise);
        self.buffer.copy_frame(frame.as_ref());
        frame.is_some()
    }

    /// Shows `frame`, or black for `None`.
    pub fn show(&mut self, frame: Option<&VideoFrame>) {
        self.buffer.copy_frame(frame);
    }
}

/// Decodes until a looping decoder jumps back to the start, returning the
/// first frame after the jump.
fn run_to_wrap<D: MediaDecoder + ?Sized>(decoder: &mut D) -> Option<VideoFrame> {
    let mut steps = 0u32;
    let mut last = None;
    loop {
        let before = decoder.video_time();
        let Some(frame) = decoder.decode_video() else {
            break;
        };
        steps += 1;
        let wrapped = frame.time_secs < before;
        last = Some(frame);
        if wrapped {
            break;
        }
    }
    tracing::trace!(steps, "ran decoder to its loop point");
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::controller::VideoOnlyController;
    use crate::decoder::{SyntheticDecoder, SyntheticStream};
    use std::sync::Arc;

    const FPS: f64 = 30.0;

    struct Fixture {
        controller: Box<dyn Controller<SyntheticDecoder>>,
        clock: ManualClock,
        stepper: FrameStepper,
    }

    fn fixture(policy: CatchUpPolicy) -> Fixture {
        let stream = SyntheticStream::new(2, 2, FPS, Duration::from_secs(10));
        let clock = ManualClock::new();
        let controller =
            VideoOnlyController::new(SyntheticDecoder::new(stream), Arc::new(clock.clone()));
        Fixture {
            controller: Box::new(controller),
            clock,
            stepper: FrameStepper::new(2, 2, FPS, 0.0, policy),
        }
    }

    fn shown(image: &RgbaImage) -> Option<u64> {
        SyntheticDecoder::frame_index_of(image.as_raw())
    }

    fn frames_decoded(controller: &dyn Controller<SyntheticDecoder>) -> u64 {
        controller.lock().frames_decoded()
    }

    #[test]
    fn stays_black_before_first_frame_is_due() {
        let mut f = fixture(CatchUpPolicy::default());
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), None);
        assert_eq!(frames_decoded(f.controller.as_ref()), 0);
    }

    #[test]
    fn shows_frame_for_position() {
        let mut f = fixture(CatchUpPolicy::default());
        f.controller.play();
        f.clock.advance(Duration::from_millis(1_010));
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), Some(30));
    }

    #[test]
    fn repeated_query_reuses_buffer() {
        let mut f = fixture(CatchUpPolicy::default());
        f.controller.play();
        f.clock.advance(Duration::from_millis(500));
        let first = f.stepper.current_frame(f.controller.as_ref()).clone();
        let decoded = frames_decoded(f.controller.as_ref());

        let second = f.stepper.current_frame(f.controller.as_ref()).clone();
        assert_eq!(first, second);
        assert_eq!(frames_decoded(f.controller.as_ref()), decoded);
    }

    #[test]
    fn catch_up_decodes_every_frame_by_default() {
        let mut f = fixture(CatchUpPolicy::default());
        f.controller.play();
        f.clock.advance(Duration::from_millis(5_010));
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), Some(150));
        assert_eq!(frames_decoded(f.controller.as_ref()), 151);
    }

    #[test]
    fn seek_threshold_skips_intervening_frames() {
        let mut f = fixture(CatchUpPolicy {
            seek_threshold_frames: Some(30),
        });
        f.controller.play();
        f.clock.advance(Duration::from_millis(5_010));
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), Some(150));
        assert!(frames_decoded(f.controller.as_ref()) < 20);
        // The position authority is untouched by the internal seek
        assert_eq!(f.controller.position(), Duration::from_millis(5_010));
    }

    #[test]
    fn small_gap_below_threshold_steps_sequentially() {
        let mut f = fixture(CatchUpPolicy {
            seek_threshold_frames: Some(30),
        });
        f.controller.play();
        f.clock.advance(Duration::from_millis(510));
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), Some(15));
        assert_eq!(frames_decoded(f.controller.as_ref()), 16);
    }

    #[test]
    fn ended_video_shows_black() {
        let mut f = fixture(CatchUpPolicy::default());
        f.controller.play();
        f.clock.advance(Duration::from_secs(12));
        // Catches up to the last frame, hitting the end of the stream
        assert!(shown(f.stepper.current_frame(f.controller.as_ref())).is_some());
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), None);
        assert!(f.stepper.buffer().is_black());
    }

    #[test]
    fn sync_correction_shifts_target() {
        let mut f = fixture(CatchUpPolicy::default());
        f.stepper = FrameStepper::new(2, 2, FPS, -0.5, CatchUpPolicy::default());
        f.controller.play();
        f.clock.advance(Duration::from_millis(1_010));
        assert_eq!(shown(f.stepper.current_frame(f.controller.as_ref())), Some(15));
    }

    #[test]
    fn seek_shows_landing_frame_immediately() {
        let mut f = fixture(CatchUpPolicy::default());
        assert!(f
            .stepper
            .seek(f.controller.as_ref(), Duration::from_millis(2_200), true));
        assert_eq!(shown(f.stepper.frame()), Some(66));
    }

    #[test]
    fn failed_seek_blanks_buffer() {
        let mut f = fixture(CatchUpPolicy::default());
        f.stepper.seek(f.controller.as_ref(), Duration::from_secs(1), true);
        assert!(!f.stepper.seek(f.controller.as_ref(), Duration::from_secs(12), false));
        assert!(f.stepper.buffer().is_black());
    }

    #[test]
    fn stops_when_looping_decoder_wraps() {
        let stream = SyntheticStream::new(1, 1, 10.0, Duration::from_secs(1));
        let clock = ManualClock::new();
        let controller: Box<dyn Controller<SyntheticDecoder>> = Box::new(
            VideoOnlyController::new(SyntheticDecoder::new(stream), Arc::new(clock.clone())),
        );
        controller.lock().set_looping(true);
        let mut stepper = FrameStepper::new(1, 1, 10.0, 0.0, CatchUpPolicy::default());

        controller.play();
        clock.advance(Duration::from_millis(1_500));
        // 10 frames to the end, then the wrap back to frame 0 stops the loop
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(0));
        assert_eq!(controller.lock().frames_decoded(), 11);
    }

    #[test]
    fn follows_decoder_to_loop_point_when_position_wrapped_first() {
        let stream = SyntheticStream::new(1, 1, 10.0, Duration::from_secs(1));
        let clock = ManualClock::new();
        let controller: Box<dyn Controller<SyntheticDecoder>> = Box::new(
            VideoOnlyController::new(SyntheticDecoder::new(stream), Arc::new(clock.clone())),
        );
        controller.lock().set_looping(true);
        let mut stepper = FrameStepper::new(1, 1, 10.0, 0.0, CatchUpPolicy::default());

        controller.play();
        clock.advance(Duration::from_millis(950));
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(9));

        clock.advance(Duration::from_millis(200));
        controller.wrap_back(Duration::from_secs(1));
        stepper.mark_wrapped();
        // Position is now 150 ms: frame 1, reached through the decoder's wrap
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(1));
        assert_eq!(controller.lock().frames_decoded(), 12);
    }

    #[test]
    fn looping_decoder_ahead_of_position_keeps_frame() {
        let stream = SyntheticStream::new(1, 1, 25.0, Duration::from_secs(4));
        let clock = ManualClock::new();
        let controller: Box<dyn Controller<SyntheticDecoder>> = Box::new(
            VideoOnlyController::new(SyntheticDecoder::new(stream), Arc::new(clock.clone())),
        );
        controller.lock().set_looping(true);
        let mut stepper = FrameStepper::new(1, 1, 25.0, -0.2, CatchUpPolicy::default());

        assert!(stepper.seek(controller.as_ref(), Duration::from_secs(2), true));
        assert_eq!(shown(stepper.frame()), Some(50));
        let decoded = controller.lock().frames_decoded();

        // The target sits 200 ms behind the decoder, which never wrapped
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(50));
        assert_eq!(controller.lock().frames_decoded(), decoded);
    }

    #[test]
    fn wrap_mark_lasts_one_query() {
        let stream = SyntheticStream::new(1, 1, 10.0, Duration::from_secs(1));
        let clock = ManualClock::new();
        let controller: Box<dyn Controller<SyntheticDecoder>> = Box::new(
            VideoOnlyController::new(SyntheticDecoder::new(stream), Arc::new(clock.clone())),
        );
        controller.lock().set_looping(true);
        let mut stepper = FrameStepper::new(1, 1, 10.0, -0.5, CatchUpPolicy::default());

        assert!(stepper.seek(controller.as_ref(), Duration::from_millis(850), true));
        stepper.mark_wrapped();
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(3));
        let decoded = controller.lock().frames_decoded();

        // A second query without a new wrap leaves the decoder alone
        assert_eq!(shown(stepper.current_frame(controller.as_ref())), Some(3));
        assert_eq!(controller.lock().frames_decoded(), decoded);
    }
}
