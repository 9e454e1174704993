// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! # Categories
//!
//! - **Audio**: Output buffer hint and volume bounds
//! - **Clock**: Sticky audio clock smoothing and A/V correction
//! - **Catch-up**: Frame stepping policy

// ==========================================================================
// Audio Defaults
// ==========================================================================

/// Buffer size hint handed to the audio backend, in milliseconds.
pub const DEFAULT_AUDIO_BUFFER_MS: u32 = 100;

/// Smallest buffer hint accepted, in milliseconds.
pub const MIN_AUDIO_BUFFER_MS: u32 = 10;

/// Largest buffer hint accepted, in milliseconds.
pub const MAX_AUDIO_BUFFER_MS: u32 = 1_000;

/// Default playback volume.
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Minimum volume level.
pub const MIN_VOLUME: f32 = 0.0;

/// Maximum volume level.
pub const MAX_VOLUME: f32 = 1.0;

/// Maximum number of audio channels the audio-driven controller accepts.
pub const MAX_AUDIO_CHANNELS: u16 = 2;

// ==========================================================================
// Clock Defaults
// ==========================================================================

/// Upper bound of the advance synthesized while the audio clock reports
/// the same value, in milliseconds.
pub const DEFAULT_CLOCK_SMOOTHING_CAP_MS: u32 = 10;

/// Largest smoothing cap accepted, in milliseconds.
pub const MAX_CLOCK_SMOOTHING_CAP_MS: u32 = 100;

/// Offset added to the playback position before frame lookup, in milliseconds.
pub const DEFAULT_SYNC_CORRECTION_MS: i32 = 0;

// ==========================================================================
// Catch-up Defaults
// ==========================================================================

/// Gap (in frames) above which the stepper seeks instead of decoding every
/// intermediate frame. `None` decodes sequentially no matter the gap.
pub const DEFAULT_CATCH_UP_SEEK_THRESHOLD_FRAMES: Option<u32> = None;
