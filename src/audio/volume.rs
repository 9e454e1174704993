// SPDX-License-Identifier: MPL-2.0
//! Output gain applied to decoded samples before they reach the device.

use crate::config::{DEFAULT_VOLUME, MAX_VOLUME, MIN_VOLUME};

/// Linear gain in `0.0..=1.0`. No amplification: 1.0 plays samples as decoded.
///
/// # Example
///
/// ```
/// use vidclock::audio::Volume;
///
/// assert_eq!(Volume::new(0.25).value(), 0.25);
/// assert_eq!(Volume::new(2.0).value(), 1.0);
/// assert_eq!(Volume::from_f64(-1.0).value(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    /// Creates a new volume level, clamping to valid range. NaN is muted.
    #[must_use]
    pub fn new(volume: f32) -> Self {
        if volume.is_nan() {
            return Self(MIN_VOLUME);
        }
        Self(volume.clamp(MIN_VOLUME, MAX_VOLUME))
    }

    /// Creates a volume from the `f64` used by the public player API.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f64(volume: f64) -> Self {
        Self::new(volume as f32)
    }

    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }

    /// Below the audible threshold; backends may skip mixing.
    #[must_use]
    pub fn is_muted(self) -> bool {
        self.0 < 0.001
    }

    /// Stores the volume as bits for atomic access.
    #[must_use]
    pub fn to_bits(self) -> u32 {
        self.0.to_bits()
    }

    /// Restores a volume stored with [`Volume::to_bits`].
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self::new(f32::from_bits(bits))
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(DEFAULT_VOLUME)
    }
}
