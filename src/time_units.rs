// SPDX-License-Identifier: MPL-2.0
//! Time unit conversion utilities.
//!
//! Decoders speak `f64` seconds, controllers speak [`Duration`]. These helpers
//! convert between the two and never panic: negative or NaN seconds saturate
//! to zero, values too large for a `Duration` saturate to [`Duration::MAX`].

use std::time::Duration;

/// Converts seconds to a `Duration`, saturating at both ends.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vidclock::time_units::secs_to_duration;
///
/// assert_eq!(secs_to_duration(1.5), Duration::from_millis(1_500));
/// assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
/// ```
#[inline]
#[must_use]
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Converts a `Duration` to seconds (f64).
#[inline]
#[must_use]
pub fn duration_to_secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Duration of one frame in seconds, or zero for a non-positive framerate.
///
/// # Examples
///
/// ```
/// use vidclock::time_units::frame_duration_secs;
///
/// assert_eq!(frame_duration_secs(25.0), 0.04);
/// assert_eq!(frame_duration_secs(0.0), 0.0);
/// ```
#[inline]
#[must_use]
pub fn frame_duration_secs(framerate: f64) -> f64 {
    if framerate > 0.0 {
        1.0 / framerate
    } else {
        0.0
    }
}

/// Number of whole frames between two times, zero when `to` is not ahead.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frames_between(from_secs: f64, to_secs: f64, framerate: f64) -> u64 {
    let gap = (to_secs - from_secs) * framerate;
    if gap.is_nan() || gap <= 0.0 {
        0
    } else {
        gap.floor() as u64
    }
}

/// Duration of `frames` audio frames at `sample_rate`.
#[inline]
#[must_use]
pub fn samples_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    let secs = frames / rate;
    let rem = frames % rate;
    // rem < rate <= u32::MAX, so the product fits in u64
    let nanos = rem * 1_000_000_000 / rate;
    Duration::new(secs, nanos as u32)
}
