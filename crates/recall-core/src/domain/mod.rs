//! Domain types for audio playback.

mod audio;
mod status;

pub use audio::{
    AudioFormat, AudioPayload, BufferId, EncodedChunk, MediaErrorCode, SessionId, SourceRef,
    TransportEncoding,
};
pub use status::{PlaybackState, PlaybackStatus};
