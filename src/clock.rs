// SPDX-License-Identifier: MPL-2.0
//! Wall clocks and audio clock smoothing.
//!
//! Playback position comes from one of two authorities: a wall-clock
//! reference pair (video-only streams) or the audio backend's own clock
//! (streams with audio). This module provides the pieces both need:
//!
//! - [`WallClock`]: where "now" comes from. [`SystemClock`] in production,
//!   [`ManualClock`] when time must be driven explicitly.
//! - [`StickySmoother`]: hides the coarse resolution of audio backends whose
//!   reported position stays the same across several reads.
//! - [`Offset`]: the signed seek compensation between the backend's clock,
//!   which can't be reset, and the stream position.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of monotonic instants.
pub trait WallClock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a player and
/// advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += by;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to a wall clock.
pub type SharedWallClock = Arc<dyn WallClock>;

/// Smooths a raw clock that reports the same value across several reads.
///
/// When the raw value is unchanged since the last observation, an advance of
/// `min(now - last_change, cap)` is synthesized. The cap keeps the readout
/// from running ahead of the real clock by more than one backend tick.
/// Output never decreases between two observations.
#[derive(Debug, Clone, Copy)]
pub struct StickySmoother {
    last_value: Duration,
    last_instant: Instant,
    last_output: Duration,
    cap: Duration,
}

impl StickySmoother {
    #[must_use]
    pub fn new(cap: Duration, now: Instant) -> Self {
        Self {
            last_value: Duration::ZERO,
            last_instant: now,
            last_output: Duration::ZERO,
            cap,
        }
    }

    /// Returns `raw` adjusted for a stuck clock.
    pub fn smooth(&mut self, raw: Duration, now: Instant) -> Duration {
        let value = if raw == self.last_value {
            let stuck_for = now.saturating_duration_since(self.last_instant);
            raw + stuck_for.min(self.cap)
        } else {
            self.last_value = raw;
            self.last_instant = now;
            raw
        };
        // A tick smaller than the synthesized advance must not step back
        self.last_output = self.last_output.max(value);
        self.last_output
    }

    /// Restarts smoothing from `raw`, forgetting earlier output.
    pub fn observe(&mut self, raw: Duration, now: Instant) {
        self.last_value = raw;
        self.last_instant = now;
        self.last_output = raw;
    }

    #[must_use]
    pub fn cap(&self) -> Duration {
        self.cap
    }
}

/// Signed difference between a backend clock and the stream position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offset {
    nanos: i128,
}

impl Offset {
    /// Offset such that `apply(clock) == position`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn between(clock: Duration, position: Duration) -> Self {
        Self {
            nanos: clock.as_nanos() as i128 - position.as_nanos() as i128,
        }
    }

    /// Shifts the offset so that positions read `by` earlier.
    #[allow(clippy::cast_possible_wrap)]
    pub fn push_back(&mut self, by: Duration) {
        self.nanos += by.as_nanos() as i128;
    }

    /// Converts a clock reading to a position, saturating at zero.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn apply(self, clock: Duration) -> Duration {
        let nanos = clock.as_nanos() as i128 - self.nanos;
        if nanos <= 0 {
            return Duration::ZERO;
        }
        let secs = (nanos / 1_000_000_000) as u64;
        let sub = (nanos % 1_000_000_000) as u32;
        Duration::new(secs, sub)
    }
}
