//! One playback attempt and the resources it owns.

use tokio_util::sync::CancellationToken;

use recall_core::{PlaybackStrategy, SessionId};

use crate::buffer::StreamingBufferController;

/// Resources and progress of the active playback attempt.
///
/// At most one session exists at a time. Dropping a session does not
/// release sink state; the controller tears it down explicitly.
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub key: String,
    pub strategy: PlaybackStrategy,
    /// Cancels the stream pump. Fetches are not tied to it and run to
    /// completion so their result still lands in the cache.
    pub cancel: CancellationToken,
    /// Present for streaming sessions once the buffer has been created.
    pub buffer: Option<StreamingBufferController>,
    /// At least one non-empty chunk (or a complete blob) reached the sink.
    pub data_flowing: bool,
    pub source_attached: bool,
}

impl PlaybackSession {
    pub fn new(id: SessionId, key: String, strategy: PlaybackStrategy) -> Self {
        Self {
            id,
            key,
            strategy,
            cancel: CancellationToken::new(),
            buffer: None,
            data_flowing: false,
            source_attached: false,
        }
    }

    pub fn is(&self, id: SessionId) -> bool {
        self.id == id
    }
}
