//! Transport-side ports: the audio query, the streaming subscription and the
//! runtime's format capability probe.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::{AudioPayload, EncodedChunk};
use crate::error::TransportError;

/// Stream of chunks produced by a subscription.
///
/// - `Some(Ok(chunk))`: next fragment, in arrival order
/// - `Some(Err(TransportError::Cancelled))`: cancelled, treated as completion
/// - `Some(Err(other))`: fatal failure
/// - `None`: the backend finished the stream
pub type AudioChunkStream = BoxStream<'static, Result<EncodedChunk, TransportError>>;

/// Fetch-then-play transport: one request, one complete payload.
#[async_trait]
pub trait AudioQueryPort: Send + Sync {
    /// Fetch the synthesized audio for `key`.
    ///
    /// Transport timeouts surface as [`TransportError::Timeout`]; the engine
    /// imposes none of its own.
    async fn fetch_audio(&self, key: &str) -> Result<AudioPayload, TransportError>;
}

/// Live-subscription transport: incremental chunks pushed by the backend.
pub trait AudioStreamPort: Send + Sync {
    /// Open a subscription for `key`.
    ///
    /// Dropping the returned stream unsubscribes.
    fn subscribe(&self, key: &str) -> AudioChunkStream;
}

/// Runtime media-decoding capability query.
pub trait FormatProbe: Send + Sync {
    /// Whether the runtime can decode `format` (a MIME/codec string).
    fn is_supported(&self, format: &str) -> bool;
}
