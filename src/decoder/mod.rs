// SPDX-License-Identifier: MPL-2.0
//! The audio/video decoder collaborator.
//!
//! The player never parses bitstreams itself. It drives a [`MediaDecoder`],
//! an engine that decodes the next video frame or audio chunk on demand and
//! reports its decode cursor. Two implementations ship with the crate:
//!
//! - [`SyntheticDecoder`]: deterministic, in-memory stream.
//! - `FfmpegDecoder` (feature `ffmpeg`): real files through FFmpeg.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod synthetic;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use synthetic::{SyntheticDecoder, SyntheticStream};

use std::time::Duration;

/// A decoded video frame in RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGBA pixel data (width × height × 4 bytes).
    pub rgba: Vec<u8>,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Presentation time in seconds.
    pub time_secs: f64,
}

impl VideoFrame {
    /// Returns the total size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.rgba.len()
    }
}

/// A chunk of decoded audio: interleaved signed 16-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub channels: u16,
}

impl AudioChunk {
    /// Number of frames (samples per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }
}

/// Stream metadata known once headers are parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Video frames per second.
    pub framerate: f64,
    pub duration: Duration,
    /// Channels of the selected audio stream (0 without audio).
    pub channels: u16,
    /// Native sample rate of the selected audio stream (0 without audio).
    pub sample_rate: u32,
    pub audio_streams: usize,
    pub video_streams: usize,
    /// Whether every stream had its sequence headers.
    pub has_headers: bool,
}

/// An audio/video decoding engine.
///
/// All methods advance or inspect a single decode cursor. Implementations
/// need not be thread-safe beyond `Send`: the controller serializes every
/// call behind its mutex.
pub trait MediaDecoder: Send {
    fn info(&self) -> StreamInfo;

    /// Decodes the next video frame. `None` once the video has ended.
    fn decode_video(&mut self) -> Option<VideoFrame>;

    /// Decodes the next audio chunk. `None` once the audio has ended.
    fn decode_audio(&mut self) -> Option<AudioChunk>;

    /// Seeks both streams to `target`.
    ///
    /// A fast seek (`precise == false`) lands on the nearest intra frame at or
    /// before the target. A precise seek then decodes forward to the last
    /// frame at or before the target. Returns `None` if the target is
    /// outside the stream.
    fn seek_frame(&mut self, target: Duration, precise: bool) -> Option<VideoFrame>;

    /// Presentation time of the last decoded video frame, 0 before any decode.
    fn video_time(&self) -> f64;

    fn has_video_ended(&self) -> bool;

    fn has_audio_ended(&self) -> bool;

    /// Whether every stream has ended.
    fn has_ended(&self) -> bool {
        self.has_video_ended() && self.has_audio_ended()
    }

    /// Moves both streams back to the start.
    fn rewind(&mut self);

    /// In looping mode a track that reaches its end starts over instead of
    /// ending. Video and audio wrap independently of each other.
    fn set_looping(&mut self, looping: bool);

    fn is_looping(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_frame_count_divides_by_channels() {
        let chunk = AudioChunk {
            samples: vec![0; 2304],
            channels: 2,
        };
        assert_eq!(chunk.frame_count(), 1152);

        let empty = AudioChunk {
            samples: vec![1, 2],
            channels: 0,
        };
        assert_eq!(empty.frame_count(), 0);
    }
}
