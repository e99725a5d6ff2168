//! Sink-side ports: the media sink and the incremental playback buffer.
//!
//! Both traits are object-safe and owned exclusively by the playback engine
//! (`Box<dyn MediaSink>`, `Box<dyn PlaybackBuffer>`), so methods take
//! `&mut self`. Implementations report asynchronous lifecycle changes through
//! the event handles from [`crate::ports::events`], never by calling back
//! into the engine directly.

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::domain::{AudioFormat, BufferId, SourceRef};
use crate::error::{BufferError, SinkError};
use crate::ports::events::{BufferEventSender, SinkEventSender};

/// A playback-capable destination, such as an audio element.
pub trait MediaSink: Send {
    /// Install the event handle. Called once, when the engine starts.
    fn bind(&mut self, events: SinkEventSender);

    /// Attach a content reference as the current source.
    fn attach_source(&mut self, source: SourceRef) -> Result<(), SinkError>;

    /// Release the current source (and any content reference it holds).
    /// A no-op when nothing is attached.
    fn detach_source(&mut self);

    /// Begin playback of the attached source.
    ///
    /// The returned future settles once the sink accepts or rejects the
    /// request; audible start is reported separately as
    /// [`SinkEvent::Playing`](crate::ports::SinkEvent::Playing).
    fn play(&mut self) -> BoxFuture<'static, Result<(), SinkError>>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;
}

/// Sequential-append buffer presented to the sink as one continuous source.
///
/// Initiating calls return synchronously; a synchronous `Err` is a thrown
/// failure (for example [`BufferError::QuotaExceeded`]). Completion arrives
/// later as a [`BufferEvent`](crate::ports::BufferEvent).
pub trait PlaybackBuffer: Send {
    fn id(&self) -> BufferId;

    /// Prepare the buffer for `format`. Readiness is signalled by
    /// `BufferEvent::SourceOpen`.
    fn open(&mut self, format: &AudioFormat) -> Result<(), BufferError>;

    /// Whether the buffer is open and accepting data.
    fn is_accepting(&self) -> bool;

    /// Whether an append is still being processed.
    fn is_updating(&self) -> bool;

    /// Start appending `chunk`. Not reentrant: callers must wait for
    /// `BufferEvent::UpdateEnd` before the next append.
    fn append(&mut self, chunk: Bytes) -> Result<(), BufferError>;

    /// Abort the outstanding append, if any.
    fn abort(&mut self) -> Result<(), BufferError>;

    /// Close the stream: no more data will follow.
    fn end_of_stream(&mut self) -> Result<(), BufferError>;
}

/// Creates one fresh [`PlaybackBuffer`] per streaming session.
pub trait PlaybackBufferFactory: Send + Sync {
    fn create(&self, events: BufferEventSender) -> Box<dyn PlaybackBuffer>;
}
