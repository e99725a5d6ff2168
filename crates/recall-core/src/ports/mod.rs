//! Port definitions for every collaborator of the playback engine.
//!
//! | Port | Implemented by |
//! |---|---|
//! | [`AudioQueryPort`] | HTTP/RPC query client (fetch strategy) |
//! | [`AudioStreamPort`] | streaming subscription client |
//! | [`FormatProbe`] | the runtime's decoder capability query |
//! | [`MediaSink`] | an audio element or a native output device |
//! | [`PlaybackBufferFactory`] / [`PlaybackBuffer`] | incremental media buffer |

pub mod events;
pub mod media;
pub mod transport;

pub use events::{BufferEvent, BufferEventSender, SinkEvent, SinkEventSender, SinkGeneration};
pub use media::{MediaSink, PlaybackBuffer, PlaybackBufferFactory};
pub use transport::{AudioChunkStream, AudioQueryPort, AudioStreamPort, FormatProbe};
