#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AudioFormat, AudioPayload, BufferId, EncodedChunk, MediaErrorCode, PlaybackState,
    PlaybackStatus, SessionId, SourceRef, TransportEncoding,
};
pub use error::{BufferError, PlaybackError, SinkError, TransportError};
pub use ports::{
    AudioChunkStream, AudioQueryPort, AudioStreamPort, BufferEvent, BufferEventSender,
    FormatProbe, MediaSink, PlaybackBuffer, PlaybackBufferFactory, SinkEvent, SinkEventSender,
    SinkGeneration,
};
pub use settings::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_FALLBACK_FORMAT, DEFAULT_PREFERRED_FORMAT, PlaybackSettings,
    PlaybackSettingsUpdate, PlaybackStrategy, SettingsError, validate_settings,
};

#[cfg(feature = "test-utils")]
pub mod testing;
