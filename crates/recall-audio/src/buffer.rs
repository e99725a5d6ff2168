//! Streaming buffer controller.
//!
//! Feeds decoded chunks into a [`PlaybackBuffer`] strictly one append at a
//! time, in arrival order, and finalizes the buffer exactly once when the
//! transport has finished and the queue has drained.
//!
//! The controller does no I/O of its own. It reacts to three inputs: a new
//! chunk ([`enqueue`](StreamingBufferController::enqueue)), the buffer
//! becoming ready ([`on_source_open`](StreamingBufferController::on_source_open))
//! and an append completing
//! ([`on_append_complete`](StreamingBufferController::on_append_complete)).

use std::collections::VecDeque;

use bytes::Bytes;

use recall_core::{AudioFormat, BufferId, PlaybackBuffer, PlaybackError};

pub struct StreamingBufferController {
    buffer: Box<dyn PlaybackBuffer>,
    format: AudioFormat,
    queue: VecDeque<Bytes>,
    append_in_flight: bool,
    stream_ended: bool,
    eos_sent: bool,
    source_open: bool,
}

impl StreamingBufferController {
    pub fn new(buffer: Box<dyn PlaybackBuffer>, format: AudioFormat) -> Self {
        Self {
            buffer,
            format,
            queue: VecDeque::new(),
            append_in_flight: false,
            stream_ended: false,
            eos_sent: false,
            source_open: false,
        }
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Prepare the buffer for the negotiated format.
    pub fn open(&mut self) -> Result<(), PlaybackError> {
        tracing::debug!(format = %self.format, "Opening playback buffer");
        self.buffer.open(&self.format).map_err(PlaybackError::from)
    }

    /// The buffer is ready: flush anything that arrived early.
    pub fn on_source_open(&mut self) -> Result<(), PlaybackError> {
        self.source_open = true;
        self.drain()?;
        self.try_finalize()
    }

    /// Queue a decoded chunk. Empty chunks are dropped.
    pub fn enqueue(&mut self, chunk: Bytes) -> Result<(), PlaybackError> {
        if chunk.is_empty() {
            tracing::trace!("Dropping empty audio chunk");
            return Ok(());
        }
        if self.stream_ended {
            tracing::warn!("Audio chunk arrived after end of stream; dropping");
            return Ok(());
        }
        self.queue.push_back(chunk);
        self.drain()
    }

    fn can_append(&self) -> bool {
        self.source_open
            && !self.append_in_flight
            && !self.eos_sent
            && self.buffer.is_accepting()
            && !self.buffer.is_updating()
    }

    /// Start the next append if the buffer can take one.
    fn drain(&mut self) -> Result<(), PlaybackError> {
        if !self.can_append() {
            return Ok(());
        }
        let Some(chunk) = self.queue.pop_front() else {
            return Ok(());
        };

        let len = chunk.len();
        self.append_in_flight = true;
        if let Err(e) = self.buffer.append(chunk) {
            self.append_in_flight = false;
            tracing::error!(error = %e, bytes = len, "Appending audio chunk failed");
            return Err(e.into());
        }
        tracing::trace!(bytes = len, queued = self.queue.len(), "Appending audio chunk");
        Ok(())
    }

    /// The outstanding append finished.
    pub fn on_append_complete(&mut self) -> Result<(), PlaybackError> {
        self.append_in_flight = false;
        self.drain()?;
        self.try_finalize()
    }

    /// The transport will deliver no more chunks.
    pub fn signal_end(&mut self) -> Result<(), PlaybackError> {
        if self.stream_ended {
            return Ok(());
        }
        tracing::debug!(queued = self.queue.len(), "Audio stream ended");
        self.stream_ended = true;
        self.try_finalize()
    }

    /// Send end-of-stream once the queue is empty and nothing is in flight.
    fn try_finalize(&mut self) -> Result<(), PlaybackError> {
        if !self.stream_ended
            || self.eos_sent
            || !self.queue.is_empty()
            || self.append_in_flight
            || !self.source_open
            || !self.buffer.is_accepting()
            || self.buffer.is_updating()
        {
            return Ok(());
        }
        self.eos_sent = true;
        tracing::debug!("Finalizing playback buffer");
        self.buffer.end_of_stream().map_err(PlaybackError::from)
    }

    /// Abort outstanding work and drop queued chunks. Never finalizes.
    pub fn teardown(&mut self) {
        if self.append_in_flight || self.buffer.is_updating() {
            if let Err(e) = self.buffer.abort() {
                tracing::debug!(error = %e, "Aborting playback buffer failed");
            }
        }
        self.queue.clear();
        self.append_in_flight = false;
        self.source_open = false;
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub const fn is_append_in_flight(&self) -> bool {
        self.append_in_flight
    }

    pub const fn is_stream_ended(&self) -> bool {
        self.stream_ended
    }

    pub const fn is_finalized(&self) -> bool {
        self.eos_sent
    }

    pub const fn is_source_open(&self) -> bool {
        self.source_open
    }
}

impl std::fmt::Debug for StreamingBufferController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBufferController")
            .field("buffer", &self.buffer.id())
            .field("format", &self.format)
            .field("queued", &self.queue.len())
            .field("append_in_flight", &self.append_in_flight)
            .field("stream_ended", &self.stream_ended)
            .field("eos_sent", &self.eos_sent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use recall_core::testing::{FakeBuffer, FakeBufferConfig, FakeBufferHandle};
    use recall_core::{BufferError, BufferEvent, BufferEventSender, SessionId};

    use super::*;

    type Seen = Arc<Mutex<Vec<BufferEvent>>>;

    fn manual() -> FakeBufferConfig {
        FakeBufferConfig {
            auto_open: false,
            auto_complete: false,
        }
    }

    fn controller(config: FakeBufferConfig) -> (StreamingBufferController, FakeBufferHandle, Seen) {
        let seen: Seen = Arc::default();
        let events = {
            let seen = Arc::clone(&seen);
            BufferEventSender::new(SessionId(1), move |_, ev| seen.lock().unwrap().push(ev))
        };
        let (buffer, handle) = FakeBuffer::new(BufferId(1), events, config);
        let ctrl = StreamingBufferController::new(Box::new(buffer), AudioFormat::from("audio/webm"));
        (ctrl, handle, seen)
    }

    fn chunk(bytes: &'static [u8]) -> Bytes {
        Bytes::from_static(bytes)
    }

    #[test]
    fn chunks_before_open_are_queued_then_flushed_in_order() {
        let (mut ctrl, buf, _) = controller(manual());
        ctrl.open().unwrap();
        ctrl.enqueue(chunk(b"c1")).unwrap();
        ctrl.enqueue(chunk(b"c2")).unwrap();
        assert_eq!(ctrl.queued_len(), 2);
        assert!(buf.state().appended.is_empty());

        buf.open_now();
        ctrl.on_source_open().unwrap();
        assert!(ctrl.is_append_in_flight());
        assert_eq!(ctrl.queued_len(), 1);

        assert!(buf.complete_append());
        ctrl.on_append_complete().unwrap();
        assert!(buf.complete_append());
        ctrl.on_append_complete().unwrap();

        assert_eq!(buf.contents(), b"c1c2");
        assert_eq!(buf.state().overlapping_appends, 0);
    }

    #[test]
    fn never_appends_while_previous_append_is_outstanding() {
        let (mut ctrl, buf, _) = controller(manual());
        buf.open_now();
        ctrl.on_source_open().unwrap();

        ctrl.enqueue(chunk(b"a")).unwrap();
        ctrl.enqueue(chunk(b"b")).unwrap();
        ctrl.enqueue(chunk(b"c")).unwrap();
        assert_eq!(ctrl.queued_len(), 2);
        assert_eq!(buf.state().overlapping_appends, 0);

        while buf.complete_append() {
            ctrl.on_append_complete().unwrap();
        }
        assert_eq!(buf.contents(), b"abc");
    }

    #[test]
    fn end_of_stream_waits_for_drain_and_is_sent_once() {
        let (mut ctrl, buf, seen) = controller(manual());
        buf.open_now();
        ctrl.on_source_open().unwrap();
        ctrl.enqueue(chunk(b"x")).unwrap();
        ctrl.enqueue(chunk(b"y")).unwrap();

        ctrl.signal_end().unwrap();
        assert!(!ctrl.is_finalized(), "finalized with data still queued");

        while buf.complete_append() {
            ctrl.on_append_complete().unwrap();
        }
        assert!(ctrl.is_finalized());

        ctrl.signal_end().unwrap();
        ctrl.on_append_complete().unwrap();
        assert_eq!(buf.state().end_of_stream_calls, 1);
        assert_eq!(
            seen.lock().unwrap().iter().filter(|e| **e == BufferEvent::SourceEnded).count(),
            1
        );
    }

    #[test]
    fn end_before_open_finalizes_on_open() {
        let (mut ctrl, buf, _) = controller(manual());
        ctrl.signal_end().unwrap();
        assert!(ctrl.is_stream_ended());
        assert!(!ctrl.is_source_open());
        assert!(!ctrl.is_finalized());
        buf.open_now();
        ctrl.on_source_open().unwrap();
        assert!(ctrl.is_source_open());
        assert!(ctrl.is_finalized());
        assert_eq!(buf.state().end_of_stream_calls, 1);
    }

    #[test]
    fn open_failure_is_a_buffer_error() {
        let (mut ctrl, buf, seen) = controller(FakeBufferConfig::default());
        buf.state().fail_open = Some(BufferError::InvalidState("detached".into()));

        let err = ctrl.open().unwrap_err();
        assert_eq!(
            err,
            PlaybackError::Buffer(BufferError::InvalidState("detached".into()))
        );
        assert!(buf.state().format.is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_chunks_are_dropped() {
        let (mut ctrl, buf, _) = controller(FakeBufferConfig::default());
        ctrl.open().unwrap();
        ctrl.on_source_open().unwrap();
        ctrl.enqueue(Bytes::new()).unwrap();
        assert_eq!(ctrl.queued_len(), 0);
        assert!(buf.state().appended.is_empty());
    }

    #[test]
    fn quota_error_surfaces_as_overflow_and_clears_in_flight() {
        let (mut ctrl, buf, _) = controller(manual());
        buf.open_now();
        ctrl.on_source_open().unwrap();
        buf.state().fail_append = Some(BufferError::QuotaExceeded);

        let err = ctrl.enqueue(chunk(b"big")).unwrap_err();
        assert_eq!(err, PlaybackError::BufferOverflow);
        assert!(!ctrl.is_append_in_flight());
    }

    #[test]
    fn teardown_aborts_in_flight_append_and_never_finalizes() {
        let (mut ctrl, buf, _) = controller(manual());
        buf.open_now();
        ctrl.on_source_open().unwrap();
        ctrl.enqueue(chunk(b"a")).unwrap();
        ctrl.enqueue(chunk(b"b")).unwrap();
        ctrl.signal_end().unwrap();

        ctrl.teardown();
        assert!(!ctrl.is_source_open());
        assert_eq!(buf.state().abort_calls, 1);
        assert_eq!(ctrl.queued_len(), 0);
        assert!(!ctrl.is_append_in_flight());

        // A late completion must not resurrect the session.
        ctrl.on_append_complete().unwrap();
        assert_eq!(buf.state().end_of_stream_calls, 0);
    }

    #[test]
    fn auto_completing_buffer_drains_through_events() {
        let (mut ctrl, buf, seen) = controller(FakeBufferConfig::default());
        ctrl.open().unwrap();
        ctrl.on_source_open().unwrap();
        ctrl.enqueue(chunk(b"1")).unwrap();
        ctrl.enqueue(chunk(b"2")).unwrap();
        // Completion is reported through the event handle; replay it.
        let updates = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == BufferEvent::UpdateEnd)
            .count();
        assert_eq!(updates, 1);
        ctrl.on_append_complete().unwrap();
        assert_eq!(buf.contents(), b"12");
    }
}
