//! Audio data shapes exchanged with the transport and the media sink.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Formats ────────────────────────────────────────────────────────

/// A container/codec string understood by the runtime's decoder
/// (e.g. `audio/webm; codecs=opus`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioFormat(String);

impl AudioFormat {
    #[must_use]
    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AudioFormat {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ── Transport payloads ─────────────────────────────────────────────

/// How bytes are encoded on the wire.
///
/// The websocket transport ships audio as base64 text; direct HTTP bodies
/// carry raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportEncoding {
    #[default]
    Identity,
    Base64,
}

/// A complete synthesized payload for one text key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    /// Payload bytes, still in their transport encoding.
    pub data: Bytes,

    /// MIME type of the decoded audio (e.g. `audio/mpeg`).
    pub mime_type: String,

    /// Wire encoding of `data`.
    pub encoding: TransportEncoding,
}

impl AudioPayload {
    /// Payload whose bytes are already raw audio.
    #[must_use]
    pub fn raw(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            encoding: TransportEncoding::Identity,
        }
    }

    /// Payload carrying base64 text.
    #[must_use]
    pub fn base64(text: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(text.into()),
            mime_type: mime_type.into(),
            encoding: TransportEncoding::Base64,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One fragment of a streaming subscription, still in its transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub encoding: TransportEncoding,
}

impl EncodedChunk {
    #[must_use]
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            encoding: TransportEncoding::Identity,
        }
    }

    #[must_use]
    pub fn base64(text: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(text.into()),
            encoding: TransportEncoding::Base64,
        }
    }
}

// ── Sink-side identifiers ──────────────────────────────────────────

/// Identity of one playback session.
///
/// Ids are allocated monotonically starting at 1; [`SessionId::NONE`] stamps
/// events emitted while no session owns the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a playback buffer created for a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Content reference handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// An incremental playback buffer (streaming strategy).
    Buffer(BufferId),

    /// A complete decoded blob (fetch strategy or cache hit).
    Blob { data: Bytes, mime_type: String },
}

// ── Media errors ───────────────────────────────────────────────────

/// Error code reported by the media sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
    Other(u16),
}

impl MediaErrorCode {
    /// Message surfaced in `PlaybackStatus::error_message`.
    #[must_use]
    pub fn message(self) -> String {
        match self {
            Self::Aborted => "Playback aborted.".to_string(),
            Self::Network => "Network error during playback.".to_string(),
            Self::Decode => "Audio decoding error (check format).".to_string(),
            Self::SourceNotSupported => "Audio source/format not supported.".to_string(),
            Self::Other(code) => format!("Playback error (code {code})."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_error_messages() {
        assert_eq!(MediaErrorCode::Decode.message(), "Audio decoding error (check format).");
        assert_eq!(MediaErrorCode::Other(7).message(), "Playback error (code 7).");
    }

    #[test]
    fn session_none_is_zero() {
        assert!(SessionId::NONE.is_none());
        assert!(!SessionId(3).is_none());
        assert_eq!(SessionId(3).to_string(), "#3");
    }

    #[test]
    fn payload_constructors_set_encoding() {
        assert_eq!(
            AudioPayload::base64("AAEC", "audio/mpeg").encoding,
            TransportEncoding::Base64
        );
        assert!(AudioPayload::raw(Vec::new(), "audio/mpeg").is_empty());
    }
}
