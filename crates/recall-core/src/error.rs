//! Playback error types.
//!
//! Collaborator failures ([`TransportError`], [`BufferError`], [`SinkError`])
//! are folded into [`PlaybackError`], whose `Display` text is what callers
//! see in `PlaybackStatus::error_message`.

use thiserror::Error;

use crate::domain::MediaErrorCode;

/// Failure reported by the audio transport (query or subscription).
///
/// `Clone` because one fetch result is shared by every deduplicated waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Backend could not be reached.
    #[error("Speech synthesis service unavailable: {0}")]
    Unavailable(String),

    /// The transport gave up waiting for the backend.
    #[error("Speech synthesis request timed out")]
    Timeout,

    /// The call was cancelled (usually because we unsubscribed).
    #[error("Speech synthesis request cancelled")]
    Cancelled,

    /// The backend rejected the request.
    #[error("Invalid speech synthesis request: {0}")]
    InvalidArgument(String),

    /// Non-success status from the backend.
    #[error("Speech synthesis failed ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Cancellation is a normal completion, never an error surface.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure raised by a playback buffer operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The buffer cannot hold more data.
    #[error("Audio buffer full")]
    QuotaExceeded,

    /// The buffer cannot decode the requested format.
    #[error("Audio format not supported by buffer: {0}")]
    NotSupported(String),

    /// Operation invoked while the buffer was closed or mid-update.
    #[error("Invalid buffer state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Other(String),
}

/// Failure raised by the media sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// `play()` was refused, typically an autoplay policy.
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),

    /// Media element error code.
    #[error("{}", .0.message())]
    Media(MediaErrorCode),

    /// The sink has no attached source or has shut down.
    #[error("Media sink detached")]
    Detached,

    #[error("{0}")]
    Other(String),
}

/// Error taxonomy of the playback engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// No viable codec in this runtime. Terminal, never retried.
    #[error("No supported audio format available")]
    UnsupportedFormat,

    /// Transport or backend failure. Retry by calling `play()` again.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Capacity exceeded while appending.
    #[error("Audio buffer full.")]
    BufferOverflow,

    /// Any other buffer failure.
    #[error("Failed to buffer audio data: {0}")]
    Buffer(BufferError),

    /// The data could not be decoded (transport encoding or media).
    #[error("Audio decoding error: {0}")]
    Decode(String),

    /// Media sink failure.
    #[error("{0}")]
    Sink(#[from] SinkError),

    /// The user stopped playback. Benign.
    #[error("Playback cancelled")]
    CancelledByUser,

    /// Invalid construction-time configuration.
    #[error("Invalid playback configuration: {0}")]
    Config(String),

    /// The playback service task has shut down.
    #[error("Playback service is not running")]
    ServiceClosed,
}

impl PlaybackError {
    /// Benign errors are completions, not failures.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::CancelledByUser | Self::Transport(TransportError::Cancelled)
        )
    }
}

impl From<BufferError> for PlaybackError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::QuotaExceeded => Self::BufferOverflow,
            BufferError::NotSupported(_) => Self::UnsupportedFormat,
            other => Self::Buffer(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_maps_to_overflow() {
        let err: PlaybackError = BufferError::QuotaExceeded.into();
        assert_eq!(err, PlaybackError::BufferOverflow);
        assert_eq!(err.to_string(), "Audio buffer full.");
    }

    #[test]
    fn cancellation_is_benign() {
        assert!(PlaybackError::CancelledByUser.is_benign());
        assert!(PlaybackError::from(TransportError::Cancelled).is_benign());
        assert!(!PlaybackError::from(TransportError::Timeout).is_benign());
        assert!(!PlaybackError::BufferOverflow.is_benign());
    }

    #[test]
    fn sink_media_error_uses_code_message() {
        let err = PlaybackError::from(SinkError::Media(MediaErrorCode::Network));
        assert_eq!(err.to_string(), "Network error during playback.");
    }
}
