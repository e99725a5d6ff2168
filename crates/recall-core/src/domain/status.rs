//! Observable playback status.
//!
//! [`PlaybackStatus`] is the single source of truth published to callers.
//! Exactly one value is live at any time; the engine replaces it wholesale
//! on every transition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the audio player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No active session.
    #[default]
    Idle,

    /// Playback buffer and session are being constructed (streaming).
    Initializing,

    /// Waiting for the complete payload (fetch).
    Loading,

    /// Waiting for enough data to start or resume playback.
    Buffering,

    /// The sink reports audible playback.
    Playing,

    /// Paused by the user or the runtime while the session is still valid.
    Paused,

    /// Natural end of the audio.
    Finished,

    /// Unrecoverable failure; the session has been torn down.
    Error,

    /// No decodable audio format is available in this runtime.
    Unsupported,
}

impl PlaybackState {
    /// States that `stop()` leaves untouched: idle plus the three end states.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Error | Self::Unsupported | Self::Finished
        )
    }

    /// States that sink lifecycle events can never move away from.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Unsupported)
    }

    /// Lowercase label, identical to the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Loading => "loading",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the player published on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    /// Current lifecycle state.
    pub state: PlaybackState,

    /// Human-readable reason, set for `error`, `unsupported` and
    /// runtime-initiated pauses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Key of the text currently associated with playback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_text: Option<String>,
}

impl PlaybackStatus {
    /// The initial status: idle, no text.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            error_message: None,
            current_text: None,
        }
    }

    /// Same text, new state, message cleared.
    #[must_use]
    pub fn with_state(&self, state: PlaybackState) -> Self {
        Self {
            state,
            error_message: None,
            current_text: self.current_text.clone(),
        }
    }

    /// Same text, new state, with a message attached.
    #[must_use]
    pub fn with_message(&self, state: PlaybackState, message: impl Into<String>) -> Self {
        Self {
            state,
            error_message: Some(message.into()),
            current_text: self.current_text.clone(),
        }
    }

    /// A fresh status for a newly started session.
    #[must_use]
    pub fn for_text(state: PlaybackState, text: impl Into<String>) -> Self {
        Self {
            state,
            error_message: None,
            current_text: Some(text.into()),
        }
    }
}
