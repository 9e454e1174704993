// SPDX-License-Identifier: MPL-2.0
//! Error types for opening and configuring a player.
//!
//! Only construction can fail. Once a [`Player`](crate::Player) exists, end of
//! stream is reported through booleans and failed seeks through `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The stream contains no video stream.
    #[error("stream doesn't include any video stream")]
    NoVideoStream,

    /// One or more streams are missing their sequence headers.
    #[error("one or more streams are missing headers")]
    MissingHeaders,

    /// The stream has audio but no audio context was supplied.
    #[error("stream has audio but no audio context is active")]
    NoAudioContext,

    /// Audio output and stream sample rates differ (no resampling is done).
    #[error("audio stream sample rate ({stream} Hz) doesn't match audio context ({output} Hz)")]
    SampleRateMismatch { stream: u32, output: u32 },

    /// More than two audio channels.
    #[error("audio streams with {0} channels are not supported (max 2)")]
    TooManyChannels(u16),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("audio output error: {0}")]
    Audio(String),
}

impl Error {
    /// Returns true for the errors reported by stream validation at open time.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NoVideoStream
                | Error::MissingHeaders
                | Error::NoAudioContext
                | Error::SampleRateMismatch { .. }
                | Error::TooManyChannels(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
