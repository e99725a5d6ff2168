//! CLI-specific error types and exit codes.

use thiserror::Error;

use recall_core::{PlaybackError, TransportError};

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Playback ended in `error` or `unsupported`, or the engine refused to start.
    #[error("{0}")]
    Playback(String),

    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// The speech backend could not be reached or rejected the request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// No usable audio output device.
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Map error to an exit code (see sysexits.h).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Playback(_) => 1,
            Self::Arguments(_) => 2,
            Self::Backend(_) => 69,     // EX_UNAVAILABLE
            Self::AudioDevice(_) => 71, // EX_OSERR
            Self::Config(_) => 78,      // EX_CONFIG
        }
    }
}

impl From<PlaybackError> for CliError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::Config(msg) => Self::Config(msg),
            PlaybackError::Transport(e) => e.into(),
            other => Self::Playback(other.to_string()),
        }
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        Self::Backend(err.to_string())
    }
}
