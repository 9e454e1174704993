// SPDX-License-Identifier: MPL-2.0
//! The audio output collaborator.
//!
//! Audio backends are pull-based: once playing, the backend asks an
//! [`AudioSource`] for bytes on its own schedule and keeps its own clock of
//! how much it has played. Samples travel as interleaved signed 16-bit
//! little-endian PCM at the stream's native rate.
//!
//! Backends:
//! - [`SimulatedContext`]: headless backend driven by explicit pumps.
//! - `CpalContext` (feature `cpal`): the system output device.

#[cfg(feature = "cpal")]
mod cpal_output;
mod simulated;
mod volume;

#[cfg(feature = "cpal")]
pub use cpal_output::{CpalContext, CpalSink};
pub use simulated::{SimulatedContext, SimulatedSink};
pub use volume::Volume;

use std::time::Duration;

use crate::error::Result;

/// Bytes per sample in the pull format (S16LE).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Outcome of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pull {
    /// Bytes written to the start of the destination.
    pub written: usize,
    /// The source has nothing left and never will.
    pub ended: bool,
}

/// Producer side of the pull contract.
pub trait AudioSource: Send {
    /// Fills `dest` with as many bytes as are available right now.
    fn pull(&mut self, dest: &mut [u8]) -> Pull;
}

/// Volume access, the only audio-specific capability exposed to hosts.
pub trait AudioControls: Send + Sync {
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
}

/// Playback handle created by an [`AudioContext`].
pub trait AudioSink: AudioControls {
    fn play(&self);
    fn pause(&self);
    fn is_playing(&self) -> bool;

    /// Amount of audio played so far. May advance in coarse steps.
    fn current(&self) -> Duration;
}

/// An active audio output able to create sinks.
pub trait AudioContext {
    /// Output sample rate in Hz. Sources must match it.
    fn sample_rate(&self) -> u32;

    /// Creates a paused sink that pulls from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open an output stream.
    fn new_sink(
        &self,
        source: Box<dyn AudioSource>,
        channels: u16,
        buffer_hint: Duration,
    ) -> Result<Box<dyn AudioSink>>;
}

/// Writes samples as S16LE bytes into `dest`, returning how many samples fit.
///
/// A sample that doesn't fit whole is not written.
pub fn write_samples_le(samples: &[i16], dest: &mut [u8]) -> usize {
    let mut written = 0;
    for (sample, slot) in samples
        .iter()
        .zip(dest.chunks_exact_mut(BYTES_PER_SAMPLE))
    {
        slot.copy_from_slice(&sample.to_le_bytes());
        written += 1;
    }
    written
}

/// Appends samples as S16LE bytes.
pub fn extend_samples_le(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}
