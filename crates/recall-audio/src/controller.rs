//! Playback controller: sole owner of the sink, the active session and the
//! status channel.
//!
//! Everything runs on one task. Commands from [`AudioPlaybackService`] and
//! events from the sink, the playback buffer and the transport tasks arrive
//! on a single channel. Every event is tagged with the [`SessionId`] it
//! belongs to, and events for anything but the current session are dropped,
//! so a superseded session can never act on its successor.
//!
//! [`AudioPlaybackService`]: crate::AudioPlaybackService

use std::ops::ControlFlow;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use recall_core::{
    AudioChunkStream, AudioFormat, AudioPayload, AudioStreamPort, BufferEvent, BufferEventSender,
    EncodedChunk, MediaSink, PlaybackBufferFactory, PlaybackError, PlaybackSettings,
    PlaybackState, PlaybackStatus, PlaybackStrategy, SessionId, SinkError, SinkEvent,
    SinkEventSender, SinkGeneration, SourceRef, TransportError,
};

use crate::buffer::StreamingBufferController;
use crate::cache::AudioCache;
use crate::log_key;
use crate::machine::{AUTOPLAY_BLOCKED_MESSAGE, Effect, Transition, Trigger, transition};
use crate::negotiate::FormatNegotiator;
use crate::service::PlaybackDeps;
use crate::session::PlaybackSession;
use crate::transport::{decode_chunk, decode_payload};

/// Message used when a complete payload turns out to be empty.
const NO_AUDIO_MESSAGE: &str = "No audio data received.";

/// Message used for asynchronous buffer failures.
const BUFFER_ERROR_MESSAGE: &str = "Audio buffering error.";

// ── Inputs ─────────────────────────────────────────────────────────

/// Requests from the service handle.
#[derive(Debug)]
pub enum Command {
    Play(String),
    Stop,
    WarmCache(String),
    SetAudioEnabled(bool),
    Shutdown,
}

/// Something that happened on behalf of one session.
#[derive(Debug)]
pub enum SessionEvent {
    Sink(SinkEvent),
    Buffer(BufferEvent),
    Chunk(EncodedChunk),
    StreamFinished,
    StreamFailed(TransportError),
    FetchSettled(Result<AudioPayload, TransportError>),
    PlaySettled(Result<(), SinkError>),
}

#[derive(Debug)]
pub enum Input {
    Command(Command),
    Event {
        session: SessionId,
        event: SessionEvent,
    },
}

pub type InputSender = mpsc::UnboundedSender<Input>;

fn deliver(inputs: &InputSender, session: SessionId, event: SessionEvent) {
    // A closed channel means the controller is gone; nothing left to notify.
    let _ = inputs.send(Input::Event { session, event });
}

// ── Controller ─────────────────────────────────────────────────────

pub struct PlaybackController {
    strategy: PlaybackStrategy,
    audio_enabled: bool,
    negotiator: FormatNegotiator,
    cache: AudioCache,
    stream: Option<Arc<dyn AudioStreamPort>>,
    buffers: Option<Arc<dyn PlaybackBufferFactory>>,
    sink: Box<dyn MediaSink>,
    generation: SinkGeneration,
    inputs: InputSender,
    status: watch::Sender<PlaybackStatus>,
    session: Option<PlaybackSession>,
    next_session: u64,
}

impl PlaybackController {
    pub fn new(settings: &PlaybackSettings, deps: PlaybackDeps, inputs: InputSender) -> Self {
        let PlaybackDeps {
            query,
            stream,
            buffers,
            probe,
            mut sink,
        } = deps;

        let generation = SinkGeneration::new();
        let sink_inputs = inputs.clone();
        sink.bind(SinkEventSender::new(generation.clone(), move |session, event| {
            deliver(&sink_inputs, session, SessionEvent::Sink(event));
        }));

        let (status, _) = watch::channel(PlaybackStatus::idle());
        Self {
            strategy: settings.strategy,
            audio_enabled: settings.audio_enabled,
            negotiator: FormatNegotiator::new(settings.format_candidates(), probe),
            cache: AudioCache::new(query, settings.cache_capacity),
            stream,
            buffers,
            sink,
            generation,
            inputs,
            status,
            session: None,
            next_session: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub const fn cache(&self) -> &AudioCache {
        &self.cache
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// Process inputs until shutdown, then release the sink.
    pub async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        tracing::debug!(strategy = ?self.strategy, "Playback controller started");
        while let Some(input) = inputs.recv().await {
            if self.handle(input).is_break() {
                break;
            }
        }
        self.apply(Trigger::Stopped);
        tracing::debug!("Playback controller stopped");
    }

    pub fn handle(&mut self, input: Input) -> ControlFlow<()> {
        match input {
            Input::Command(command) => self.handle_command(command),
            Input::Event { session, event } => {
                self.handle_event(session, event);
                ControlFlow::Continue(())
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Play(key) => self.play(key),
            Command::Stop => {
                tracing::info!("Stopping playback");
                self.apply(Trigger::Stopped);
            }
            Command::WarmCache(key) => {
                if key.trim().is_empty() {
                    tracing::debug!("Ignoring prefetch of empty text");
                } else {
                    drop(self.cache.warm(&key));
                }
            }
            Command::SetAudioEnabled(enabled) => self.set_audio_enabled(enabled),
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn set_audio_enabled(&mut self, enabled: bool) {
        if self.audio_enabled == enabled {
            return;
        }
        self.audio_enabled = enabled;
        tracing::info!(enabled, "Audio playback toggled");
        if !enabled {
            self.apply(Trigger::Stopped);
        }
    }

    // ── Starting sessions ──────────────────────────────────────────

    fn play(&mut self, key: String) {
        if !self.audio_enabled {
            tracing::debug!(key = %log_key(&key), "Audio disabled; ignoring play request");
            return;
        }
        if key.trim().is_empty() {
            tracing::warn!("Ignoring play request with empty text");
            return;
        }

        let current = self.status();
        let active = self
            .session
            .as_ref()
            .filter(|s| s.key == key && !current.state.is_settled())
            .map(|s| s.id);
        if let Some(id) = active {
            if current.state == PlaybackState::Paused {
                tracing::debug!(session = %id, "Resuming paused playback");
                self.attempt_play();
            } else {
                tracing::debug!(session = %id, "Playback already active for this text");
            }
            return;
        }

        let Some(format) = self.negotiator.select_format().cloned() else {
            self.apply(Trigger::Stopped);
            let message = PlaybackError::UnsupportedFormat.to_string();
            tracing::warn!(key = %log_key(&key), "Refusing playback: {message}");
            self.publish(
                PlaybackStatus::for_text(PlaybackState::Unsupported, key)
                    .with_message(PlaybackState::Unsupported, message),
            );
            return;
        };

        // Supersede whatever was playing before.
        self.apply(Trigger::Stopped);

        self.next_session += 1;
        let id = SessionId(self.next_session);
        tracing::info!(
            session = %id,
            key = %log_key(&key),
            strategy = ?self.strategy,
            "Starting playback"
        );

        match self.strategy {
            PlaybackStrategy::Streaming => match self.cache.peek(&key) {
                Some(payload) => {
                    tracing::debug!(session = %id, "Playing cached audio");
                    self.begin(id, key, PlaybackStrategy::Fetch);
                    self.play_payload(&payload);
                }
                None => self.start_stream(id, key, format),
            },
            PlaybackStrategy::Fetch => self.start_fetch(id, key),
        }
    }

    /// Install a new session and publish its initial status.
    fn begin(&mut self, id: SessionId, key: String, initial: PlaybackStrategy) {
        self.session = Some(PlaybackSession::new(id, key.clone(), self.strategy));
        self.apply(Trigger::Started {
            key,
            strategy: initial,
        });
    }

    fn start_stream(&mut self, id: SessionId, key: String, format: AudioFormat) {
        self.begin(id, key.clone(), PlaybackStrategy::Streaming);

        let (Some(port), Some(factory)) = (self.stream.clone(), self.buffers.clone()) else {
            self.fail(PlaybackError::Config(
                "streaming requires a stream port and a buffer factory".into(),
            ));
            return;
        };

        let buffer_inputs = self.inputs.clone();
        let events = BufferEventSender::new(id, move |session, event| {
            deliver(&buffer_inputs, session, SessionEvent::Buffer(event));
        });
        let buffer = StreamingBufferController::new(factory.create(events), format);
        let source = SourceRef::Buffer(buffer.buffer_id());
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.buffer = Some(buffer);
        let cancel = session.cancel.clone();

        self.generation.set(id);
        if let Err(e) = self.sink.attach_source(source) {
            self.fail(e.into());
            return;
        }
        self.mark_attached(false);

        if let Err(e) = self.with_buffer(StreamingBufferController::open) {
            self.fail(e);
            return;
        }

        let stream = port.subscribe(&key);
        tokio::spawn(pump_stream(stream, cancel, self.inputs.clone(), id));
    }

    fn start_fetch(&mut self, id: SessionId, key: String) {
        self.begin(id, key.clone(), PlaybackStrategy::Fetch);

        // The fetch is not cancelled with the session: a late result still
        // fills the cache, and the controller discards it as stale.
        let cache = self.cache.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = cache.get_or_fetch(&key).await;
            deliver(&inputs, id, SessionEvent::FetchSettled(result));
        });
    }

    /// Attach a complete payload as a blob and start playback.
    fn play_payload(&mut self, payload: &AudioPayload) {
        let data = match decode_payload(payload) {
            Ok(data) => data,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        let Some(id) = self.session.as_ref().map(|s| s.id) else {
            return;
        };

        tracing::debug!(session = %id, bytes = data.len(), mime = %payload.mime_type, "Attaching audio blob");
        self.generation.set(id);
        let source = SourceRef::Blob {
            data,
            mime_type: payload.mime_type.clone(),
        };
        if let Err(e) = self.sink.attach_source(source) {
            self.fail(e.into());
            return;
        }
        self.mark_attached(true);
        self.attempt_play();
    }

    fn mark_attached(&mut self, with_data: bool) {
        if let Some(session) = self.session.as_mut() {
            session.source_attached = true;
            session.data_flowing |= with_data;
        }
    }

    fn attempt_play(&mut self) {
        let Some(id) = self.session.as_ref().map(|s| s.id) else {
            return;
        };
        let play = self.sink.play();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = play.await;
            deliver(&inputs, id, SessionEvent::PlaySettled(result));
        });
    }

    // ── Events ─────────────────────────────────────────────────────

    fn handle_event(&mut self, session: SessionId, event: SessionEvent) {
        if !self.session.as_ref().is_some_and(|s| s.is(session)) {
            tracing::trace!(session = %session, ?event, "Dropping event from inactive session");
            return;
        }

        match event {
            SessionEvent::Sink(event) => self.on_sink_event(event),
            SessionEvent::Buffer(event) => self.on_buffer_event(event),
            SessionEvent::Chunk(chunk) => self.on_chunk(chunk),
            SessionEvent::StreamFinished => {
                tracing::debug!(session = %session, "Audio stream completed");
                self.drive_buffer(StreamingBufferController::signal_end);
            }
            SessionEvent::StreamFailed(error) => self.on_stream_error(error),
            SessionEvent::FetchSettled(result) => self.on_fetch_settled(result),
            SessionEvent::PlaySettled(result) => self.on_play_settled(result),
        }
    }

    fn on_sink_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Started => tracing::trace!("Sink accepted play request"),
            SinkEvent::Playing => self.apply(Trigger::SinkPlaying),
            SinkEvent::Waiting | SinkEvent::Stalled => self.apply(Trigger::SinkWaiting),
            SinkEvent::Paused => self.apply(Trigger::SinkPaused),
            SinkEvent::Ended => self.apply(Trigger::SinkEnded),
            SinkEvent::Error(code) => {
                tracing::error!(?code, "Media sink reported an error");
                self.apply(Trigger::Failed {
                    message: code.message(),
                });
            }
        }
    }

    fn on_buffer_event(&mut self, event: BufferEvent) {
        match event {
            BufferEvent::SourceOpen => {
                tracing::debug!("Playback buffer open");
                self.drive_buffer(StreamingBufferController::on_source_open);
                self.apply(Trigger::SourceOpened);
            }
            BufferEvent::UpdateEnd => {
                self.drive_buffer(StreamingBufferController::on_append_complete);
            }
            BufferEvent::SourceEnded => tracing::debug!("Playback buffer finalized"),
            BufferEvent::SourceClose => {
                tracing::debug!("Playback buffer closed");
                self.apply(Trigger::SourceClosed);
            }
            BufferEvent::Error(message) => {
                tracing::error!(%message, "Playback buffer error");
                self.apply(Trigger::Failed {
                    message: BUFFER_ERROR_MESSAGE.to_string(),
                });
            }
        }
    }

    fn on_chunk(&mut self, chunk: EncodedChunk) {
        if self.status().state.is_settled() {
            tracing::debug!("Audio chunk arrived after playback settled; stopping");
            self.apply(Trigger::Stopped);
            return;
        }
        let bytes = match decode_chunk(chunk) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.data_flowing = true;
        }
        self.drive_buffer(|buffer| buffer.enqueue(bytes));
    }

    fn on_stream_error(&mut self, error: TransportError) {
        if !error.is_cancelled() {
            self.fail(error.into());
            return;
        }
        let data_flowing = self.session.as_ref().is_some_and(|s| s.data_flowing);
        if data_flowing {
            tracing::debug!("Audio stream cancelled after data; finishing playback");
            self.drive_buffer(StreamingBufferController::signal_end);
        } else {
            tracing::debug!("Audio stream cancelled before any data");
            self.apply(Trigger::CancelledBeforeData);
        }
    }

    fn on_fetch_settled(&mut self, result: Result<AudioPayload, TransportError>) {
        match result {
            Err(e) if e.is_cancelled() => self.apply(Trigger::CancelledBeforeData),
            Err(e) => self.fail(e.into()),
            Ok(payload) if payload.is_empty() => {
                tracing::warn!("Fetched audio payload is empty");
                self.apply(Trigger::Failed {
                    message: NO_AUDIO_MESSAGE.to_string(),
                });
            }
            Ok(payload) => self.play_payload(&payload),
        }
    }

    fn on_play_settled(&mut self, result: Result<(), SinkError>) {
        match result {
            Ok(()) => {}
            Err(SinkError::PlaybackRejected(reason)) => {
                tracing::warn!(%reason, "Sink refused to start playback");
                self.apply(Trigger::PlayRejected {
                    message: AUTOPLAY_BLOCKED_MESSAGE.to_string(),
                });
            }
            Err(e) => self.fail(e.into()),
        }
    }

    // ── Plumbing ───────────────────────────────────────────────────

    fn with_buffer(
        &mut self,
        op: impl FnOnce(&mut StreamingBufferController) -> Result<(), PlaybackError>,
    ) -> Result<(), PlaybackError> {
        match self.session.as_mut().and_then(|s| s.buffer.as_mut()) {
            Some(buffer) => op(buffer),
            None => Ok(()),
        }
    }

    /// Run a buffer operation, failing the session on error.
    fn drive_buffer(
        &mut self,
        op: impl FnOnce(&mut StreamingBufferController) -> Result<(), PlaybackError>,
    ) {
        if let Err(e) = self.with_buffer(op) {
            self.fail(e);
        }
    }

    fn fail(&mut self, error: PlaybackError) {
        match &error {
            PlaybackError::UnsupportedFormat => self.apply(Trigger::Unsupported {
                message: error.to_string(),
            }),
            e if e.is_benign() => self.apply(Trigger::CancelledBeforeData),
            e => {
                tracing::error!(error = %e, "Playback failed");
                self.apply(Trigger::Failed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn apply(&mut self, trigger: Trigger) {
        let Transition { status, effects } = transition(&self.status(), trigger);
        if let Some(next) = status {
            self.publish(next);
        }
        for effect in effects {
            match effect {
                Effect::Teardown => self.teardown(),
                Effect::AttemptPlay => self.attempt_play(),
            }
        }
    }

    fn publish(&self, next: PlaybackStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(from = %current.state, to = %next.state, "Playback state changed");
            *current = next;
            true
        });
    }

    /// Release everything the current session holds.
    ///
    /// The sink generation is cleared first so the pause and detach below
    /// cannot be mistaken for events of any session.
    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.generation.clear();
        session.cancel.cancel();
        if let Some(buffer) = session.buffer.as_mut() {
            buffer.teardown();
        }
        if !self.sink.is_paused() {
            self.sink.pause();
        }
        if session.source_attached {
            self.sink.detach_source();
        }
        tracing::debug!(
            session = %session.id,
            key = %log_key(&session.key),
            strategy = ?session.strategy,
            "Playback session released"
        );
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("strategy", &self.strategy)
            .field("audio_enabled", &self.audio_enabled)
            .field("status", &*self.status.borrow())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Forward stream items to the controller until the stream ends, fails or
/// the session is cancelled. Dropping the stream unsubscribes.
async fn pump_stream(
    mut stream: AudioChunkStream,
    cancel: CancellationToken,
    inputs: InputSender,
    session: SessionId,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(session = %session, "Audio stream subscription cancelled");
                return;
            }
            item = stream.next() => item,
        };
        let (event, last) = match item {
            Some(Ok(chunk)) => (SessionEvent::Chunk(chunk), false),
            Some(Err(error)) => (SessionEvent::StreamFailed(error), true),
            None => (SessionEvent::StreamFinished, true),
        };
        if inputs.send(Input::Event { session, event }).is_err() || last {
            return;
        }
    }
}
