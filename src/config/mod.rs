// SPDX-License-Identifier: MPL-2.0
//! This module handles player tuning, including loading and saving it to a
//! `player.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use vidclock::config::{self, PlayerConfig};
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Nudge video 20ms later relative to audio
//! config.sync_correction_ms = -20;
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

use crate::error::Result;
use crate::stepper::CatchUpPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use defaults::*;

const CONFIG_FILE: &str = "player.toml";
const APP_NAME: &str = "vidclock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Buffer size hint for the audio backend.
    pub audio_buffer_ms: u32,
    /// Cap on the advance synthesized for a sticky audio clock.
    pub clock_smoothing_cap_ms: u32,
    /// Added to the position before frame lookup. Negative values show
    /// earlier frames.
    pub sync_correction_ms: i32,
    /// See [`CatchUpPolicy`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_up_seek_threshold_frames: Option<u32>,
    /// Whether the decoder starts in looping mode.
    pub looping: bool,
    pub initial_volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_buffer_ms: DEFAULT_AUDIO_BUFFER_MS,
            clock_smoothing_cap_ms: DEFAULT_CLOCK_SMOOTHING_CAP_MS,
            sync_correction_ms: DEFAULT_SYNC_CORRECTION_MS,
            catch_up_seek_threshold_frames: DEFAULT_CATCH_UP_SEEK_THRESHOLD_FRAMES,
            looping: false,
            initial_volume: DEFAULT_VOLUME,
        }
    }
}

impl PlayerConfig {
    /// Audio buffer hint, clamped to the accepted range.
    #[must_use]
    pub fn audio_buffer(&self) -> Duration {
        let ms = self
            .audio_buffer_ms
            .clamp(MIN_AUDIO_BUFFER_MS, MAX_AUDIO_BUFFER_MS);
        Duration::from_millis(u64::from(ms))
    }

    /// Smoothing cap, clamped to the accepted range.
    #[must_use]
    pub fn clock_smoothing_cap(&self) -> Duration {
        let ms = self.clock_smoothing_cap_ms.min(MAX_CLOCK_SMOOTHING_CAP_MS);
        Duration::from_millis(u64::from(ms))
    }

    /// Sync correction in seconds.
    #[must_use]
    pub fn sync_correction_secs(&self) -> f64 {
        f64::from(self.sync_correction_ms) / 1_000.0
    }

    #[must_use]
    pub fn catch_up_policy(&self) -> CatchUpPolicy {
        CatchUpPolicy {
            seek_threshold_frames: self.catch_up_seek_threshold_frames,
        }
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

/// Loads the configuration from the user config directory, or the defaults
/// when no file exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load() -> Result<PlayerConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(PlayerConfig::default())
}

/// Saves the configuration to the user config directory.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save(config: &PlayerConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

/// Loads a configuration file. Invalid TOML falls back to the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn load_from_path(path: &Path) -> Result<PlayerConfig> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "invalid player config, using defaults");
            Ok(PlayerConfig::default())
        }
    }
}

/// Saves a configuration file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn save_to_path(config: &PlayerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_tuning() {
        let config = PlayerConfig {
            sync_correction_ms: -25,
            catch_up_seek_threshold_frames: Some(90),
            looping: true,
            ..PlayerConfig::default()
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("player.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("player.toml");
        fs::write(&config_path, "not = valid = toml").expect("failed to write invalid toml");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded, PlayerConfig::default());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let loaded: PlayerConfig = toml::from_str("looping = true").expect("partial config");
        assert!(loaded.looping);
        assert_eq!(loaded.audio_buffer_ms, DEFAULT_AUDIO_BUFFER_MS);
        assert_eq!(loaded.catch_up_seek_threshold_frames, None);
    }

    #[test]
    fn durations_are_clamped() {
        let config = PlayerConfig {
            audio_buffer_ms: 5_000,
            clock_smoothing_cap_ms: 500,
            ..PlayerConfig::default()
        };
        assert_eq!(config.audio_buffer(), Duration::from_millis(1_000));
        assert_eq!(config.clock_smoothing_cap(), Duration::from_millis(100));
    }

    #[test]
    fn default_config_matches_constants() {
        let config = PlayerConfig::default();
        assert_eq!(config.audio_buffer(), Duration::from_millis(100));
        assert_eq!(config.clock_smoothing_cap(), Duration::from_millis(10));
        assert!(config.sync_correction_secs().abs() < f64::EPSILON);
    }
}
