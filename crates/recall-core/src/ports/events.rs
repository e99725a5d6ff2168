//! Event handles given to the sink and to playback buffers.
//!
//! Both handles stamp every event with the [`SessionId`] it belongs to, so
//! the engine can drop events from sessions that have already been torn
//! down or superseded.
//!
//! The sink outlives sessions, so its handle reads the stamp from a shared
//! generation cell that the engine updates when a session attaches and
//! clears *before* it pauses or detaches the sink during teardown. Events
//! the sink emits in reaction to our own teardown are therefore stamped
//! [`SessionId::NONE`] and ignored. A buffer belongs to exactly one session,
//! so its handle carries a fixed stamp.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{MediaErrorCode, SessionId};

/// Lifecycle event emitted by a media sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// `play()` was accepted; audible output may not have begun yet.
    Started,
    /// Audible playback started or resumed.
    Playing,
    Paused,
    /// Natural end of the media.
    Ended,
    Error(MediaErrorCode),
    /// Playback halted waiting for data.
    Waiting,
    /// Data delivery stalled.
    Stalled,
}

/// Lifecycle event emitted by a playback buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// The buffer is attached and accepting data.
    SourceOpen,
    /// End-of-stream was applied.
    SourceEnded,
    /// The buffer was detached from the sink.
    SourceClose,
    /// The outstanding append completed.
    UpdateEnd,
    /// Asynchronous failure outside an append call.
    Error(String),
}

type Deliver<E> = Arc<dyn Fn(SessionId, E) + Send + Sync>;

/// Shared cell holding the session that currently owns the sink.
#[derive(Debug, Clone, Default)]
pub struct SinkGeneration(Arc<AtomicU64>);

impl SinkGeneration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: SessionId) {
        self.0.store(session.0, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set(SessionId::NONE);
    }

    #[must_use]
    pub fn current(&self) -> SessionId {
        SessionId(self.0.load(Ordering::SeqCst))
    }
}

/// Event handle bound into a [`MediaSink`](crate::ports::MediaSink).
#[derive(Clone)]
pub struct SinkEventSender {
    generation: SinkGeneration,
    deliver: Deliver<SinkEvent>,
}

impl SinkEventSender {
    pub fn new(
        generation: SinkGeneration,
        deliver: impl Fn(SessionId, SinkEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    /// Emit `event`, stamped with the session that owns the sink right now.
    pub fn emit(&self, event: SinkEvent) {
        (self.deliver)(self.generation.current(), event);
    }
}

impl fmt::Debug for SinkEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkEventSender")
            .field("generation", &self.generation.current())
            .finish_non_exhaustive()
    }
}

/// Event handle given to a [`PlaybackBuffer`](crate::ports::PlaybackBuffer)
/// at creation.
#[derive(Clone)]
pub struct BufferEventSender {
    session: SessionId,
    deliver: Deliver<BufferEvent>,
}

impl BufferEventSender {
    pub fn new(
        session: SessionId,
        deliver: impl Fn(SessionId, BufferEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            session,
            deliver: Arc::new(deliver),
        }
    }

    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    pub fn emit(&self, event: BufferEvent) {
        (self.deliver)(self.session, event);
    }
}

impl fmt::Debug for BufferEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferEventSender")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn sink_events_carry_generation_at_emission() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let generation = SinkGeneration::new();
        let sink = {
            let seen = Arc::clone(&seen);
            SinkEventSender::new(generation.clone(), move |id, ev| {
                seen.lock().unwrap().push((id, ev));
            })
        };

        generation.set(SessionId(4));
        sink.emit(SinkEvent::Playing);
        generation.clear();
        sink.emit(SinkEvent::Paused);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (SessionId(4), SinkEvent::Playing),
                (SessionId::NONE, SinkEvent::Paused)
            ]
        );
    }

    #[test]
    fn buffer_events_carry_fixed_session() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let buffer = {
            let seen = Arc::clone(&seen);
            BufferEventSender::new(SessionId(9), move |id, ev| {
                seen.lock().unwrap().push((id, ev));
            })
        };
        buffer.emit(BufferEvent::UpdateEnd);
        assert_eq!(buffer.session(), SessionId(9));
        assert_eq!(*seen.lock().unwrap(), vec![(SessionId(9), BufferEvent::UpdateEnd)]);
    }
}
