// SPDX-License-Identifier: MPL-2.0
//! `vidclock` is an audio-clocked video player core.
//!
//! It answers one question at any wall-clock instant: which frame should be
//! on screen, given what the audio device has actually played? Hosts open a
//! [`Player`](player::Player), call `play`, and fetch
//! [`current_frame`](player::Player::current_frame) on every redraw.
//!
//! Decoding and audio output are pluggable. The crate ships a deterministic
//! [`SyntheticDecoder`](decoder::SyntheticDecoder) and a headless
//! [`SimulatedContext`](audio::SimulatedContext); FFmpeg decoding and cpal
//! output sit behind the `ffmpeg` and `cpal` features.

#![doc(html_root_url = "https://docs.rs/vidclock/0.1.0")]

pub mod audio;
pub mod clock;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod frame_buffer;
pub mod layout;
pub mod player;
pub mod stepper;
pub mod time_units;

pub use error::{Error, Result};
pub use player::Player;
