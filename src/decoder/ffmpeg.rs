// SPDX-License-Identifier: MPL-2.0
//! FFmpeg-backed decoder for media files.
//!
//! Video and audio each read the file through their own demuxer, so they
//! decode at independent paces and a looping track restarts without moving
//! the other one. Video is scaled to RGBA at native size; audio is converted
//! to packed signed 16-bit at its native rate and channel layout.

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::{codec, decoder, format, frame, media, Packet, Rational};

use super::{AudioChunk, MediaDecoder, StreamInfo, VideoFrame};
use crate::error::{Error, Result};
use crate::time_units::{duration_to_secs, frame_duration_secs};

static FFMPEG_INIT: Once = Once::new();

/// Initializes FFmpeg once per process, keeping its own logging to errors.
fn init_ffmpeg() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Decoder(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }
    });

    init_result
}

fn rational_secs(rational: Rational) -> f64 {
    if rational.denominator() == 0 {
        return 0.0;
    }
    f64::from(rational.numerator()) / f64::from(rational.denominator())
}

/// Converts seconds to `AV_TIME_BASE` units for container seeks.
#[allow(clippy::cast_possible_truncation)]
fn to_av_time(secs: f64) -> i64 {
    (secs * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64
}

fn open_input(path: &Path) -> Result<format::context::Input> {
    format::input(&path).map_err(|e| Error::Decoder(format!("Failed to open media: {e}")))
}

/// Reads the packets of a single stream from its own input.
struct Demuxer {
    input: format::context::Input,
    index: usize,
    ended: bool,
}

impl Demuxer {
    /// The next packet of this stream, skipping the others.
    fn next_packet(&mut self) -> Option<Packet> {
        while !self.ended {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.index => return Some(packet),
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => self.ended = true,
                Err(e) => tracing::debug!(%e, "skipping unreadable packet"),
            }
        }
        None
    }

    fn seek(&mut self, secs: f64) -> bool {
        let timestamp = to_av_time(secs);
        // RangeTo lets FFmpeg land on the keyframe before the target
        if let Err(e) = self.input.seek(timestamp, ..timestamp) {
            tracing::warn!(%e, secs, "seek failed");
            return false;
        }
        self.ended = false;
        true
    }
}

struct VideoTrack {
    demuxer: Demuxer,
    decoder: decoder::Video,
    scaler: scaling::Context,
    time_base: f64,
    framerate: f64,
    eof_sent: bool,
    ended: bool,
    last_time: f64,
}

impl VideoTrack {
    fn decode(&mut self, looping: bool) -> Option<VideoFrame> {
        if self.ended {
            return None;
        }
        // A stream with no decodable frames would otherwise loop forever
        let mut looped = false;
        loop {
            let mut decoded = frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(frame) = self.convert(&decoded) {
                    return Some(frame);
                }
                continue;
            }

            if let Some(packet) = self.demuxer.next_packet() {
                if let Err(e) = self.decoder.send_packet(&packet) {
                    tracing::debug!(%e, "video packet rejected");
                }
            } else if !self.eof_sent {
                let _ = self.decoder.send_eof();
                self.eof_sent = true;
            } else if looping && !looped && self.seek(0.0) {
                looped = true;
                tracing::debug!("video looped");
            } else {
                self.ended = true;
                return None;
            }
        }
    }

    fn convert(&mut self, decoded: &frame::Video) -> Option<VideoFrame> {
        let mut rgba = frame::Video::empty();
        if let Err(e) = self.scaler.run(decoded, &mut rgba) {
            tracing::warn!(%e, "video scaling failed");
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let time_secs = match decoded.timestamp() {
            Some(pts) => pts as f64 * self.time_base,
            None => self.last_time + frame_duration_secs(self.framerate),
        };
        self.last_time = time_secs;

        Some(VideoFrame {
            rgba: extract_rgba_data(&rgba),
            width: rgba.width(),
            height: rgba.height(),
            time_secs,
        })
    }

    /// Moves the demuxer to the intra frame at or before `secs`.
    fn seek(&mut self, secs: f64) -> bool {
        if !self.demuxer.seek(secs) {
            return false;
        }
        self.decoder.flush();
        self.eof_sent = false;
        self.ended = false;
        self.last_time = secs;
        true
    }
}

struct AudioTrack {
    demuxer: Demuxer,
    decoder: decoder::Audio,
    resampler: resampling::Context,
    time_base: f64,
    channels: u16,
    sample_rate: u32,
    eof_sent: bool,
    ended: bool,
    /// Samples before this time are dropped after a seek.
    skip_until: Option<f64>,
}

impl AudioTrack {
    fn decode(&mut self, looping: bool) -> Option<AudioChunk> {
        let mut looped = false;
        loop {
            if self.ended {
                return None;
            }

            let mut decoded = frame::Audio::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                match self.convert(&decoded) {
                    Some(chunk) if !chunk.samples.is_empty() => return Some(chunk),
                    _ => continue,
                }
            }

            if let Some(packet) = self.demuxer.next_packet() {
                if let Err(e) = self.decoder.send_packet(&packet) {
                    tracing::debug!(%e, "audio packet rejected");
                }
            } else if !self.eof_sent {
                let _ = self.decoder.send_eof();
                self.eof_sent = true;
            } else if looping && !looped && self.seek(0.0, None) {
                looped = true;
                tracing::debug!("audio looped");
            } else {
                self.ended = true;
            }
        }
    }

    fn convert(&mut self, decoded: &frame::Audio) -> Option<AudioChunk> {
        let mut packed = frame::Audio::empty();
        if let Err(e) = self.resampler.run(decoded, &mut packed) {
            tracing::warn!(%e, "audio conversion failed");
            return None;
        }

        let channels = usize::from(self.channels.max(1));
        let data = packed.data(0);
        let sample_count = packed.samples() * channels;
        let mut samples: Vec<i16> = data
            .chunks_exact(2)
            .take(sample_count)
            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
            .collect();

        if let Some(target) = self.skip_until {
            #[allow(clippy::cast_precision_loss)]
            let start = decoded
                .timestamp()
                .map_or(target, |pts| pts as f64 * self.time_base);
            let rate = f64::from(self.sample_rate.max(1));
            let frames = samples.len() / channels;
            #[allow(clippy::cast_precision_loss)]
            let end = start + frames as f64 / rate;
            if end <= target {
                samples.clear();
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let skip = (((target - start) * rate).max(0.0) as usize).min(frames);
                samples.drain(..skip * channels);
                self.skip_until = None;
            }
        }

        Some(AudioChunk {
            samples,
            channels: self.channels,
        })
    }

    /// Moves the demuxer to `secs`, dropping samples before `skip_until`.
    fn seek(&mut self, secs: f64, skip_until: Option<f64>) -> bool {
        if !self.demuxer.seek(secs) {
            return false;
        }
        self.decoder.flush();
        self.eof_sent = false;
        self.ended = false;
        self.skip_until = skip_until;
        true
    }
}

/// Decodes a media file with FFmpeg.
pub struct FfmpegDecoder {
    video: VideoTrack,
    audio: Option<AudioTrack>,
    info: StreamInfo,
    looping: bool,
}

// SAFETY: the FFmpeg contexts are owned exclusively by this value and only
// touched through `&mut self`. None of them is bound to the thread that
// created it, so moving the whole decoder to another thread is sound.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    /// Opens `path` and selects its best video and audio streams.
    ///
    /// A file with audio is opened twice, once per track.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, can't be parsed, or a codec
    /// can't be opened. A file without video is reported as
    /// [`Error::NoVideoStream`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Io(format!("Video file not found: {}", path.display())));
        }
        init_ffmpeg()?;

        let input = open_input(path)?;
        let video_streams = count_streams(&input, media::Type::Video);
        let audio_streams = count_streams(&input, media::Type::Audio);
        let duration = if input.duration() > 0 {
            Duration::from_micros(input.duration().unsigned_abs())
        } else {
            Duration::ZERO
        };

        let video = open_video_track(input)?;
        let audio = if audio_streams > 0 {
            Some(open_audio_track(open_input(path)?)?)
        } else {
            None
        };
        let framerate = video.framerate;

        let info = StreamInfo {
            width: video.decoder.width(),
            height: video.decoder.height(),
            framerate,
            duration,
            channels: audio.as_ref().map_or(0, |a| a.channels),
            sample_rate: audio.as_ref().map_or(0, |a| a.sample_rate),
            audio_streams,
            video_streams,
            has_headers: video.decoder.width() > 0 && video.decoder.height() > 0 && framerate > 0.0,
        };

        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            framerate,
            ?duration,
            audio_streams,
            "media opened"
        );

        Ok(Self {
            video,
            audio,
            info,
            looping: false,
        })
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn decode_video(&mut self) -> Option<VideoFrame> {
        self.video.decode(self.looping)
    }

    fn decode_audio(&mut self) -> Option<AudioChunk> {
        let looping = self.looping;
        self.audio.as_mut()?.decode(looping)
    }

    fn seek_frame(&mut self, target: Duration, precise: bool) -> Option<VideoFrame> {
        if target >= self.info.duration {
            return None;
        }
        let target_secs = duration_to_secs(target);
        if !self.video.seek(target_secs) {
            return None;
        }

        let mut landing = self.decode_video()?;
        if precise {
            let frame_duration = frame_duration_secs(self.info.framerate);
            while landing.time_secs + frame_duration <= target_secs {
                match self.decode_video() {
                    Some(frame) if frame.time_secs <= target_secs => landing = frame,
                    Some(_) | None => break,
                }
            }
        }
        self.video.last_time = landing.time_secs;

        let audio_from = if precise {
            target_secs
        } else {
            landing.time_secs
        };
        if let Some(audio) = self.audio.as_mut() {
            audio.seek(audio_from, Some(audio_from));
        }
        Some(landing)
    }

    fn video_time(&self) -> f64 {
        self.video.last_time
    }

    fn has_video_ended(&self) -> bool {
        self.video.ended
    }

    fn has_audio_ended(&self) -> bool {
        self.audio.as_ref().is_none_or(|a| a.ended)
    }

    fn rewind(&mut self) {
        self.video.seek(0.0);
        if let Some(audio) = self.audio.as_mut() {
            audio.seek(0.0, None);
        }
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn is_looping(&self) -> bool {
        self.looping
    }
}

fn count_streams(input: &format::context::Input, kind: media::Type) -> usize {
    input
        .streams()
        .filter(|stream| stream.parameters().medium() == kind)
        .count()
}

fn open_video_track(input: format::context::Input) -> Result<VideoTrack> {
    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or(Error::NoVideoStream)?;
    let index = stream.index();
    let time_base = rational_secs(stream.time_base());
    let framerate = rational_secs(stream.avg_frame_rate());
    let context = codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| Error::Decoder(format!("Failed to create codec context: {e}")))?;
    let decoder = context
        .decoder()
        .video()
        .map_err(|e| Error::Decoder(format!("Failed to create video decoder: {e}")))?;

    let scaler = scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGBA,
        decoder.width(),
        decoder.height(),
        scaling::Flags::BILINEAR,
    )
    .map_err(|e| Error::Decoder(format!("Failed to create scaler: {e}")))?;

    Ok(VideoTrack {
        demuxer: Demuxer {
            input,
            index,
            ended: false,
        },
        decoder,
        scaler,
        time_base,
        framerate,
        eof_sent: false,
        ended: false,
        last_time: 0.0,
    })
}

fn open_audio_track(input: format::context::Input) -> Result<AudioTrack> {
    let stream = input
        .streams()
        .best(media::Type::Audio)
        .ok_or_else(|| Error::Decoder("No audio stream found".to_string()))?;
    let index = stream.index();
    let time_base = rational_secs(stream.time_base());
    let context = codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| Error::Decoder(format!("Failed to create codec context: {e}")))?;
    let decoder = context
        .decoder()
        .audio()
        .map_err(|e| Error::Decoder(format!("Failed to create audio decoder: {e}")))?;

    // Format conversion only: same layout, same rate
    let resampler = resampling::Context::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        Sample::I16(SampleType::Packed),
        decoder.channel_layout(),
        decoder.rate(),
    )
    .map_err(|e| Error::Decoder(format!("Failed to create audio converter: {e}")))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let channels = decoder.channels() as u16;

    Ok(AudioTrack {
        demuxer: Demuxer {
            input,
            index,
            ended: false,
        },
        sample_rate: decoder.rate(),
        decoder,
        resampler,
        time_base,
        channels,
        eof_sent: false,
        ended: false,
        skip_until: None,
    })
}

/// Extracts RGBA data from a scaled frame, dropping row padding.
fn extract_rgba_data(frame: &frame::Video) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let data = frame.data(0);
    let stride = frame.stride(0);

    let mut rgba_bytes = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * stride;
        let row_end = row_start + width * 4;
        rgba_bytes.extend_from_slice(&data[row_start..row_end]);
    }
    rgba_bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_secs_handles_zero_denominator() {
        assert!((rational_secs(Rational::new(1, 25)) - 0.04).abs() < 1e-12);
        assert!(rational_secs(Rational::new(1, 0)).abs() < f64::EPSILON);
    }

    #[test]
    fn av_time_is_microseconds() {
        assert_eq!(to_av_time(1.5), 1_500_000);
    }

    #[test]
    fn open_missing_file_fails() {
        let result = FfmpegDecoder::open("/nonexistent/clip.mpg");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn looping_audio_leaves_video_cursor_alone() {
        let path = Path::new("tests/data/sample.mp4");
        if !path.exists() {
            return; // Skip if test file doesn't exist
        }
        let mut decoder = FfmpegDecoder::open(path).expect("sample opens");
        if decoder.info().audio_streams == 0 {
            return;
        }
        decoder.set_looping(true);

        let first = decoder.decode_video().expect("sample has video");
        let video_time = decoder.video_time();
        let audio_secs = duration_to_secs(decoder.info().duration) + 1.0;
        let rate = f64::from(decoder.info().sample_rate);
        let mut decoded_secs = 0.0;
        while decoded_secs < audio_secs {
            let chunk = decoder.decode_audio().expect("looping audio never ends");
            #[allow(clippy::cast_precision_loss)]
            let chunk_secs = chunk.frame_count() as f64 / rate;
            decoded_secs += chunk_secs;
        }

        assert!(!decoder.has_audio_ended());
        assert!((decoder.video_time() - video_time).abs() < f64::EPSILON);
        let second = decoder.decode_video().expect("sample has a second frame");
        assert!(second.time_secs > first.time_secs);
    }
}
