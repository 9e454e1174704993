// SPDX-License-Identifier: MPL-2.0
//! Deterministic in-memory decoder.
//!
//! Produces a stream with known timing and known content so that playback
//! logic can run without media files or codecs. Every pixel of frame `n`
//! holds `n + 1` in its RGB bytes (little-endian), which keeps a decoded
//! frame distinguishable from a black fill. Audio is a sawtooth that
//! depends on the sample index and channel.

use std::time::Duration;

use super::{AudioChunk, MediaDecoder, StreamInfo, VideoFrame};

/// Default distance between intra frames, in frames.
pub const DEFAULT_INTRA_INTERVAL: u64 = 15;

/// Default number of audio frames per decoded chunk (one MPEG-1 layer II frame).
pub const DEFAULT_AUDIO_CHUNK_FRAMES: usize = 1152;

/// Shape of a synthetic stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticStream {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub duration: Duration,
    /// Frames between intra frames; fast seeks land on multiples of this.
    pub intra_interval: u64,
    pub audio_channels: u16,
    pub sample_rate: u32,
    pub audio_streams: usize,
    pub video_streams: usize,
    pub has_headers: bool,
    pub audio_chunk_frames: usize,
}

impl SyntheticStream {
    /// A video-only stream.
    #[must_use]
    pub fn new(width: u32, height: u32, framerate: f64, duration: Duration) -> Self {
        Self {
            width,
            height,
            framerate,
            duration,
            intra_interval: DEFAULT_INTRA_INTERVAL,
            audio_channels: 0,
            sample_rate: 0,
            audio_streams: 0,
            video_streams: 1,
            has_headers: true,
            audio_chunk_frames: DEFAULT_AUDIO_CHUNK_FRAMES,
        }
    }

    /// Adds one audio stream.
    #[must_use]
    pub fn with_audio(mut self, channels: u16, sample_rate: u32) -> Self {
        self.audio_channels = channels;
        self.sample_rate = sample_rate;
        self.audio_streams = 1;
        self
    }

    #[must_use]
    pub fn with_intra_interval(mut self, frames: u64) -> Self {
        self.intra_interval = frames.max(1);
        self
    }

    #[must_use]
    pub fn with_audio_chunk_frames(mut self, frames: usize) -> Self {
        self.audio_chunk_frames = frames.max(1);
        self
    }

    /// Drops the video stream, leaving only audio (if any).
    #[must_use]
    pub fn without_video(mut self) -> Self {
        self.video_streams = 0;
        self
    }

    /// Marks the stream headers as missing.
    #[must_use]
    pub fn without_headers(mut self) -> Self {
        self.has_headers = false;
        self
    }

    fn has_audio(&self) -> bool {
        self.audio_streams > 0 && self.audio_channels > 0 && self.sample_rate > 0
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn frame_count(&self) -> u64 {
        (self.duration.as_secs_f64() * self.framerate).round().max(0.0) as u64
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn audio_frame_count(&self) -> u64 {
        if !self.has_audio() {
            return 0;
        }
        (self.duration.as_secs_f64() * f64::from(self.sample_rate)).round() as u64
    }
}

/// A [`MediaDecoder`] over a [`SyntheticStream`].
#[derive(Debug, Clone)]
pub struct SyntheticDecoder {
    stream: SyntheticStream,
    frame_count: u64,
    next_frame: u64,
    last_time: f64,
    video_ended: bool,
    audio_total: u64,
    audio_cursor: u64,
    audio_ended: bool,
    looping: bool,
    frames_decoded: u64,
}

impl SyntheticDecoder {
    #[must_use]
    pub fn new(stream: SyntheticStream) -> Self {
        let frame_count = stream.frame_count();
        let audio_total = stream.audio_frame_count();
        let audio_ended = !stream.has_audio();
        Self {
            stream,
            frame_count,
            next_frame: 0,
            last_time: 0.0,
            video_ended: false,
            audio_total,
            audio_cursor: 0,
            audio_ended,
            looping: false,
            frames_decoded: 0,
        }
    }

    /// Total frames in the stream.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Video frames decoded so far, seeks included.
    #[must_use]
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Recovers the frame index from a synthetic RGBA buffer.
    ///
    /// Returns `None` for a black (or otherwise foreign) buffer.
    #[must_use]
    pub fn frame_index_of(rgba: &[u8]) -> Option<u64> {
        let pixel = rgba.get(..3)?;
        let encoded =
            u64::from(pixel[0]) | (u64::from(pixel[1]) << 8) | (u64::from(pixel[2]) << 16);
        encoded.checked_sub(1)
    }

    /// Expected sample value at an audio frame and channel.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn sample_at(frame: u64, channel: u16) -> i16 {
        ((frame % 256) as i16 - 128) * 100 + channel as i16
    }

    fn frame_time(&self, index: u64) -> f64 {
        index as f64 / self.stream.framerate
    }

    #[allow(clippy::cast_possible_truncation)]
    fn render(&mut self, index: u64) -> VideoFrame {
        self.frames_decoded += 1;
        let encoded = index + 1;
        let pixel = [
            (encoded & 0xff) as u8,
            ((encoded >> 8) & 0xff) as u8,
            ((encoded >> 16) & 0xff) as u8,
            255,
        ];
        let pixels = self.stream.width as usize * self.stream.height as usize;
        let mut rgba = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            rgba.extend_from_slice(&pixel);
        }
        VideoFrame {
            rgba,
            width: self.stream.width,
            height: self.stream.height,
            time_secs: self.frame_time(index),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn audio_frame_at(&self, secs: f64) -> u64 {
        ((secs * f64::from(self.stream.sample_rate)).floor() as u64).min(self.audio_total)
    }
}

impl MediaDecoder for SyntheticDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.stream.width,
            height: self.stream.height,
            framerate: self.stream.framerate,
            duration: self.stream.duration,
            channels: self.stream.audio_channels,
            sample_rate: self.stream.sample_rate,
            audio_streams: self.stream.audio_streams,
            video_streams: self.stream.video_streams,
            has_headers: self.stream.has_headers,
        }
    }

    fn decode_video(&mut self) -> Option<VideoFrame> {
        if self.video_ended || self.stream.video_streams == 0 {
            return None;
        }
        if self.next_frame >= self.frame_count {
            if self.looping && self.frame_count > 0 {
                self.next_frame = 0;
            } else {
                self.video_ended = true;
                return None;
            }
        }
        let index = self.next_frame;
        let frame = self.render(index);
        self.last_time = frame.time_secs;
        self.next_frame += 1;
        Some(frame)
    }

    fn decode_audio(&mut self) -> Option<AudioChunk> {
        if self.audio_ended {
            return None;
        }
        if self.audio_cursor >= self.audio_total {
            if self.looping && self.audio_total > 0 {
                self.audio_cursor = 0;
            } else {
                self.audio_ended = true;
                return None;
            }
        }
        let channels = self.stream.audio_channels;
        let remaining = self.audio_total - self.audio_cursor;
        let frames = remaining.min(self.stream.audio_chunk_frames as u64);
        let mut samples = Vec::with_capacity(frames as usize * usize::from(channels));
        for frame in self.audio_cursor..self.audio_cursor + frames {
            for channel in 0..channels {
                samples.push(Self::sample_at(frame, channel));
            }
        }
        self.audio_cursor += frames;
        Some(AudioChunk { samples, channels })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn seek_frame(&mut self, target: Duration, precise: bool) -> Option<VideoFrame> {
        if target >= self.stream.duration || self.frame_count == 0 {
            return None;
        }
        let target_secs = target.as_secs_f64();
        // The epsilon keeps exact frame boundaries from rounding one frame down
        let target_index = ((target_secs * self.stream.framerate + 1e-9).floor() as u64)
            .min(self.frame_count - 1);
        let intra_index = target_index - target_index % self.stream.intra_interval;
        let landing = if precise {
            // A precise seek decodes every frame from the intra frame on
            for _ in intra_index..target_index {
                self.frames_decoded += 1;
            }
            target_index
        } else {
            intra_index
        };

        let frame = self.render(landing);
        self.next_frame = landing + 1;
        self.last_time = frame.time_secs;
        self.video_ended = false;

        if self.stream.has_audio() {
            let audio_secs = if precise {
                target_secs
            } else {
                frame.time_secs
            };
            self.audio_cursor = self.audio_frame_at(audio_secs);
            self.audio_ended = false;
        }
        Some(frame)
    }

    fn video_time(&self) -> f64 {
        self.last_time
    }

    fn has_video_ended(&self) -> bool {
        self.video_ended || self.stream.video_streams == 0
    }

    fn has_audio_ended(&self) -> bool {
        self.audio_ended
    }

    fn rewind(&mut self) {
        self.next_frame = 0;
        self.last_time = 0.0;
        self.video_ended = false;
        self.audio_cursor = 0;
        self.audio_ended = !self.stream.has_audio();
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn is_looping(&self) -> bool {
        self.looping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ten_second_stream() -> SyntheticStream {
        SyntheticStream::new(4, 2, 30.0, Duration::from_secs(10))
    }

    #[test]
    fn decodes_frames_in_order_until_end() {
        let mut decoder = SyntheticDecoder::new(
            SyntheticStream::new(2, 2, 10.0, Duration::from_millis(300)),
        );
        assert_eq!(decoder.frame_count(), 3);

        for expected in 0..3 {
            let frame = decoder.decode_video().expect("frame");
            assert_eq!(SyntheticDecoder::frame_index_of(&frame.rgba), Some(expected));
            assert_abs_diff_eq!(decoder.video_time(), expected as f64 / 10.0);
        }
        assert!(!decoder.has_video_ended());
        assert!(decoder.decode_video().is_none());
        assert!(decoder.has_video_ended());
        assert!(decoder.has_ended());
    }

    #[test]
    fn frame_has_expected_size() {
        let mut decoder = SyntheticDecoder::new(ten_second_stream());
        let frame = decoder.decode_video().expect("frame");
        assert_eq!(frame.size_bytes(), 4 * 2 * 4);
        assert_eq!((frame.width, frame.height), (4, 2));
    }

    #[test]
    fn black_buffer_has_no_frame_index() {
        assert_eq!(SyntheticDecoder::frame_index_of(&[0, 0, 0, 255]), None);
        assert_eq!(SyntheticDecoder::frame_index_of(&[]), None);
    }

    #[test]
    fn fast_seek_lands_on_intra_frame() {
        let mut decoder = SyntheticDecoder::new(ten_second_stream().with_intra_interval(15));
        let frame = decoder
            .seek_frame(Duration::from_millis(2_200), false)
            .expect("in range");
        // 2.2s = frame 66, previous intra frame is 60
        assert_eq!(SyntheticDecoder::frame_index_of(&frame.rgba), Some(60));
        assert_abs_diff_eq!(decoder.video_time(), 2.0);
    }

    #[test]
    fn precise_seek_lands_on_target_frame() {
        let mut decoder = SyntheticDecoder::new(ten_second_stream().with_intra_interval(15));
        let frame = decoder
            .seek_frame(Duration::from_millis(2_200), true)
            .expect("in range");
        assert_eq!(SyntheticDecoder::frame_index_of(&frame.rgba), Some(66));
        assert_eq!(decoder.frames_decoded(), 7);
    }

    #[test]
    fn seek_past_end_fails_without_moving() {
        let mut decoder = SyntheticDecoder::new(ten_second_stream());
        decoder.decode_video();
        assert!(decoder.seek_frame(Duration::from_secs(12), false).is_none());
        assert!(decoder.seek_frame(Duration::from_secs(10), true).is_none());
        assert_abs_diff_eq!(decoder.video_time(), 0.0);
    }

    #[test]
    fn audio_chunks_cover_the_stream() {
        let stream = SyntheticStream::new(2, 2, 30.0, Duration::from_millis(100))
            .with_audio(2, 8_000)
            .with_audio_chunk_frames(300);
        let mut decoder = SyntheticDecoder::new(stream);

        let mut frames = 0;
        while let Some(chunk) = decoder.decode_audio() {
            assert_eq!(chunk.channels, 2);
            assert_eq!(chunk.samples[1], SyntheticDecoder::sample_at(frames as u64, 1));
            frames += chunk.frame_count();
        }
        assert_eq!(frames, 800);
        assert!(decoder.has_audio_ended());
    }

    #[test]
    fn video_only_stream_reports_audio_ended() {
        let decoder = SyntheticDecoder::new(ten_second_stream());
        assert!(decoder.has_audio_ended());
        assert!(!decoder.has_ended());
    }

    #[test]
    fn looping_wraps_to_first_frame() {
        let mut decoder =
            SyntheticDecoder::new(SyntheticStream::new(1, 1, 10.0, Duration::from_millis(200)));
        decoder.set_looping(true);
        decoder.decode_video();
        decoder.decode_video();
        let wrapped = decoder.decode_video().expect("looping never ends");
        assert_eq!(SyntheticDecoder::frame_index_of(&wrapped.rgba), Some(0));
        assert!(!decoder.has_video_ended());
    }

    #[test]
    fn looping_tracks_wrap_independently() {
        let stream = SyntheticStream::new(1, 1, 10.0, Duration::from_millis(500))
            .with_audio(1, 1_000)
            .with_audio_chunk_frames(100);
        let mut decoder = SyntheticDecoder::new(stream);
        decoder.set_looping(true);
        for _ in 0..3 {
            decoder.decode_video();
        }

        // Five chunks reach the end of the audio, the sixth starts over
        for _ in 0..5 {
            decoder.decode_audio();
        }
        let wrapped = decoder.decode_audio().expect("looping never ends");
        assert_eq!(wrapped.samples[0], SyntheticDecoder::sample_at(0, 0));

        assert_abs_diff_eq!(decoder.video_time(), 0.2);
        let next = decoder.decode_video().expect("frame");
        assert_eq!(SyntheticDecoder::frame_index_of(&next.rgba), Some(3));
    }

    #[test]
    fn rewind_restarts_both_streams() {
        let mut decoder = SyntheticDecoder::new(ten_second_stream().with_audio(1, 44_100));
        decoder.seek_frame(Duration::from_secs(5), true);
        decoder.rewind();
        assert_abs_diff_eq!(decoder.video_time(), 0.0);
        let first = decoder.decode_video().expect("frame");
        assert_eq!(SyntheticDecoder::frame_index_of(&first.rgba), Some(0));
        let chunk = decoder.decode_audio().expect("audio");
        assert_eq!(chunk.samples[0], SyntheticDecoder::sample_at(0, 0));
    }
}
