//! In-memory fakes for every port, for use in tests of the playback engine.
//!
//! Each fake comes with a cloneable handle that stays with the test after
//! the fake itself has been moved into the engine. Handles record every call
//! and let the test inject the asynchronous lifecycle events a real sink or
//! buffer would produce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::{BoxFuture, ready};
use futures_util::stream::poll_fn;
use tokio::sync::{Semaphore, mpsc};

use crate::domain::{AudioFormat, AudioPayload, BufferId, EncodedChunk, SourceRef};
use crate::error::{BufferError, SinkError, TransportError};
use crate::ports::{
    AudioChunkStream, AudioQueryPort, AudioStreamPort, BufferEvent, BufferEventSender,
    FormatProbe, MediaSink, PlaybackBuffer, PlaybackBufferFactory, SinkEvent, SinkEventSender,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Query ──────────────────────────────────────────────────────────

type Respond = Box<dyn Fn(&str) -> Result<AudioPayload, TransportError> + Send + Sync>;

/// Query port answering from a closure, optionally held behind a gate.
pub struct FakeQuery {
    calls: Mutex<Vec<String>>,
    gate: Semaphore,
    respond: Respond,
}

impl FakeQuery {
    /// Answers immediately.
    pub fn new(
        respond: impl Fn(&str) -> Result<AudioPayload, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            respond: Box::new(respond),
        })
    }

    /// Blocks every fetch until [`release`](Self::release) is called.
    pub fn gated(
        respond: impl Fn(&str) -> Result<AudioPayload, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            respond: Box::new(respond),
        })
    }

    /// Let `n` blocked fetches complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        lock(&self.calls).iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl AudioQueryPort for FakeQuery {
    async fn fetch_audio(&self, key: &str) -> Result<AudioPayload, TransportError> {
        lock(&self.calls).push(key.to_string());
        self.gate
            .acquire()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
            .forget();
        (self.respond)(key)
    }
}

// ── Stream ─────────────────────────────────────────────────────────

type ChunkSender = mpsc::UnboundedSender<Result<EncodedChunk, TransportError>>;

/// Stream port whose subscriptions are fed by the test.
#[derive(Clone, Default)]
pub struct FakeStreamPort {
    subscriptions: Arc<Mutex<HashMap<String, Vec<ChunkSender>>>>,
}

impl FakeStreamPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscriptions ever opened for `key`.
    pub fn subscriptions(&self, key: &str) -> usize {
        lock(&self.subscriptions).get(key).map_or(0, Vec::len)
    }

    fn latest(&self, key: &str) -> Option<ChunkSender> {
        lock(&self.subscriptions)
            .get(key)
            .and_then(|subs| subs.last().cloned())
    }

    /// Deliver `chunk` on the latest subscription for `key`. Returns `false`
    /// when the subscriber has gone away.
    pub fn push(&self, key: &str, chunk: EncodedChunk) -> bool {
        self.latest(key).is_some_and(|tx| tx.send(Ok(chunk)).is_ok())
    }

    /// Terminate the latest subscription for `key` with `error`.
    pub fn fail(&self, key: &str, error: TransportError) -> bool {
        self.latest(key).is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Complete every subscription for `key`.
    pub fn finish(&self, key: &str) {
        if let Some(subs) = lock(&self.subscriptions).get_mut(key) {
            subs.clear();
        }
    }

    /// Whether the latest subscriber for `key` dropped its stream.
    pub fn is_unsubscribed(&self, key: &str) -> bool {
        self.latest(key).is_none_or(|tx| tx.is_closed())
    }
}

impl AudioStreamPort for FakeStreamPort {
    fn subscribe(&self, key: &str) -> AudioChunkStream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&self.subscriptions)
            .entry(key.to_string())
            .or_default()
            .push(tx);
        poll_fn(move |cx| rx.poll_recv(cx)).boxed()
    }
}

// ── Probe ──────────────────────────────────────────────────────────

/// Probe that accepts only the listed formats and counts its calls.
#[derive(Debug, Default)]
pub struct FakeProbe {
    supported: Vec<String>,
    probes: AtomicUsize,
}

impl FakeProbe {
    pub fn supporting(formats: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            supported: formats.iter().map(ToString::to_string).collect(),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn none() -> Arc<Self> {
        Self::supporting(&[])
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl FormatProbe for FakeProbe {
    fn is_supported(&self, format: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported.iter().any(|f| f == format)
    }
}

// ── Sink ───────────────────────────────────────────────────────────

/// Recorded sink state.
#[derive(Debug)]
pub struct FakeSinkState {
    pub source: Option<SourceRef>,
    pub attach_calls: usize,
    pub detach_calls: usize,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub paused: bool,
    /// When set, `play()` is rejected with this message.
    pub reject_play: Option<String>,
    /// When set, the next `attach_source` fails.
    pub fail_attach: Option<SinkError>,
}

impl Default for FakeSinkState {
    fn default() -> Self {
        Self {
            source: None,
            attach_calls: 0,
            detach_calls: 0,
            play_calls: 0,
            pause_calls: 0,
            paused: true,
            reject_play: None,
            fail_attach: None,
        }
    }
}

/// Test-side handle to a [`FakeSink`].
#[derive(Clone, Default)]
pub struct FakeSinkHandle {
    state: Arc<Mutex<FakeSinkState>>,
    events: Arc<Mutex<Option<SinkEventSender>>>,
}

impl FakeSinkHandle {
    pub fn state(&self) -> MutexGuard<'_, FakeSinkState> {
        lock(&self.state)
    }

    /// Emit `event` as if the sink produced it.
    pub fn emit(&self, event: SinkEvent) {
        let sender = lock(&self.events).clone();
        if let Some(sender) = sender {
            sender.emit(event);
        }
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.events).is_some()
    }

    pub fn source(&self) -> Option<SourceRef> {
        self.state().source.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.state().play_calls
    }

    pub fn detach_calls(&self) -> usize {
        self.state().detach_calls
    }

    pub fn reject_play(&self, message: &str) {
        self.state().reject_play = Some(message.to_string());
    }
}

/// Media sink that records calls and emits events like an audio element.
pub struct FakeSink {
    handle: FakeSinkHandle,
}

impl FakeSink {
    pub fn new() -> (Self, FakeSinkHandle) {
        let handle = FakeSinkHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl MediaSink for FakeSink {
    fn bind(&mut self, events: SinkEventSender) {
        *lock(&self.handle.events) = Some(events);
    }

    fn attach_source(&mut self, source: SourceRef) -> Result<(), SinkError> {
        let mut state = self.handle.state();
        if let Some(err) = state.fail_attach.take() {
            return Err(err);
        }
        state.attach_calls += 1;
        state.source = Some(source);
        Ok(())
    }

    fn detach_source(&mut self) {
        let mut state = self.handle.state();
        if state.source.take().is_some() {
            state.detach_calls += 1;
        }
    }

    fn play(&mut self) -> BoxFuture<'static, Result<(), SinkError>> {
        let result = {
            let mut state = self.handle.state();
            state.play_calls += 1;
            match state.reject_play.clone() {
                Some(message) => Err(SinkError::PlaybackRejected(message)),
                None => {
                    state.paused = false;
                    Ok(())
                }
            }
        };
        if result.is_ok() {
            self.handle.emit(SinkEvent::Started);
        }
        ready(result).boxed()
    }

    fn pause(&mut self) {
        let was_playing = {
            let mut state = self.handle.state();
            state.pause_calls += 1;
            !std::mem::replace(&mut state.paused, true)
        };
        if was_playing {
            self.handle.emit(SinkEvent::Paused);
        }
    }

    fn is_paused(&self) -> bool {
        self.handle.state().paused
    }
}

// ── Buffer ─────────────────────────────────────────────────────────

/// Behaviour switches for [`FakeBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct FakeBufferConfig {
    /// Emit `SourceOpen` as soon as `open` is called.
    pub auto_open: bool,
    /// Complete each append immediately (emitting `UpdateEnd`).
    pub auto_complete: bool,
}

impl Default for FakeBufferConfig {
    fn default() -> Self {
        Self {
            auto_open: true,
            auto_complete: true,
        }
    }
}

/// Recorded buffer state.
#[derive(Debug, Default)]
pub struct FakeBufferState {
    pub format: Option<AudioFormat>,
    pub accepting: bool,
    pub updating: bool,
    pub appended: Vec<Bytes>,
    pub in_flight: Option<Bytes>,
    pub end_of_stream_calls: usize,
    pub abort_calls: usize,
    /// Appends issued while a previous one was still updating.
    pub overlapping_appends: usize,
    pub fail_open: Option<BufferError>,
    /// Consumed by the next append.
    pub fail_append: Option<BufferError>,
}

/// Test-side handle to a [`FakeBuffer`].
#[derive(Clone)]
pub struct FakeBufferHandle {
    id: BufferId,
    state: Arc<Mutex<FakeBufferState>>,
    events: BufferEventSender,
}

impl FakeBufferHandle {
    pub const fn id(&self) -> BufferId {
        self.id
    }

    pub fn state(&self) -> MutexGuard<'_, FakeBufferState> {
        lock(&self.state)
    }

    pub fn emit(&self, event: BufferEvent) {
        self.events.emit(event);
    }

    /// Every byte appended so far, concatenated in append order.
    pub fn contents(&self) -> Vec<u8> {
        self.state().appended.iter().flat_map(|c| c.iter().copied()).collect()
    }

    /// Mark the buffer open and emit `SourceOpen`.
    pub fn open_now(&self) {
        self.state().accepting = true;
        self.emit(BufferEvent::SourceOpen);
    }

    /// Finish the outstanding append. Returns `false` if none was pending.
    pub fn complete_append(&self) -> bool {
        let done = {
            let mut state = self.state();
            match state.in_flight.take() {
                Some(chunk) => {
                    state.appended.push(chunk);
                    state.updating = false;
                    true
                }
                None => false,
            }
        };
        if done {
            self.emit(BufferEvent::UpdateEnd);
        }
        done
    }

    /// Detach the buffer from the sink.
    pub fn close(&self) {
        self.state().accepting = false;
        self.emit(BufferEvent::SourceClose);
    }
}

/// Playback buffer that records appends and models the `updating` flag.
pub struct FakeBuffer {
    handle: FakeBufferHandle,
    config: FakeBufferConfig,
}

impl FakeBuffer {
    pub fn new(
        id: BufferId,
        events: BufferEventSender,
        config: FakeBufferConfig,
    ) -> (Self, FakeBufferHandle) {
        let handle = FakeBufferHandle {
            id,
            state: Arc::new(Mutex::new(FakeBufferState::default())),
            events,
        };
        (
            Self {
                handle: handle.clone(),
                config,
            },
            handle,
        )
    }
}

impl PlaybackBuffer for FakeBuffer {
    fn id(&self) -> BufferId {
        self.handle.id
    }

    fn open(&mut self, format: &AudioFormat) -> Result<(), BufferError> {
        {
            let mut state = self.handle.state();
            if let Some(err) = state.fail_open.take() {
                return Err(err);
            }
            state.format = Some(format.clone());
        }
        if self.config.auto_open {
            self.handle.open_now();
        }
        Ok(())
    }

    fn is_accepting(&self) -> bool {
        self.handle.state().accepting
    }

    fn is_updating(&self) -> bool {
        self.handle.state().updating
    }

    fn append(&mut self, chunk: Bytes) -> Result<(), BufferError> {
        {
            let mut state = self.handle.state();
            if state.updating {
                state.overlapping_appends += 1;
                return Err(BufferError::InvalidState("append while updating".into()));
            }
            if let Some(err) = state.fail_append.take() {
                return Err(err);
            }
            state.updating = true;
            state.in_flight = Some(chunk);
        }
        if self.config.auto_complete {
            self.handle.complete_append();
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<(), BufferError> {
        let mut state = self.handle.state();
        state.abort_calls += 1;
        state.in_flight = None;
        state.updating = false;
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<(), BufferError> {
        {
            let mut state = self.handle.state();
            if !state.accepting {
                return Err(BufferError::InvalidState("buffer not open".into()));
            }
            state.end_of_stream_calls += 1;
            state.accepting = false;
        }
        self.handle.emit(BufferEvent::SourceEnded);
        Ok(())
    }
}

/// Factory handing out [`FakeBuffer`]s and keeping their handles.
#[derive(Default)]
pub struct FakeBufferFactory {
    config: FakeBufferConfig,
    next_id: AtomicU64,
    created: Mutex<Vec<FakeBufferHandle>>,
    fail_next_open: Mutex<Option<BufferError>>,
}

impl FakeBufferFactory {
    pub fn new(config: FakeBufferConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            next_id: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
            fail_next_open: Mutex::new(None),
        })
    }

    /// The next buffer handed out fails its `open` with `err`.
    pub fn fail_next_open(&self, err: BufferError) {
        *lock(&self.fail_next_open) = Some(err);
    }

    pub fn created(&self) -> Vec<FakeBufferHandle> {
        lock(&self.created).clone()
    }

    pub fn last(&self) -> Option<FakeBufferHandle> {
        lock(&self.created).last().cloned()
    }
}

impl PlaybackBufferFactory for FakeBufferFactory {
    fn create(&self, events: BufferEventSender) -> Box<dyn PlaybackBuffer> {
        let id = BufferId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (buffer, handle) = FakeBuffer::new(id, events, self.config);
        handle.state().fail_open = lock(&self.fail_next_open).take();
        lock(&self.created).push(handle);
        Box::new(buffer)
    }
}
