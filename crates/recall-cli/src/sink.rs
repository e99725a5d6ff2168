//! Native audio output for the fetch strategy.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so the output device
//! lives on a dedicated OS thread. [`RodioSink`] is the `Send` proxy the
//! playback engine owns; every [`MediaSink`] call becomes a [`SinkCommand`]
//! sent to that thread.
//!
//! Only complete blobs can be played. An incremental buffer source is
//! rejected as unsupported.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;

use recall_core::{MediaErrorCode, MediaSink, SinkError, SinkEvent, SinkEventSender, SourceRef};

use crate::error::CliError;

// ── Commands ───────────────────────────────────────────────────────

enum SinkCommand {
    Bind(SinkEventSender),

    /// Decode a blob and queue it, paused.
    Attach {
        data: Bytes,
        mime_type: String,
        reply: mpsc::Sender<Result<(), SinkError>>,
    },

    Play {
        reply: oneshot::Sender<Result<(), SinkError>>,
    },

    Pause,

    Detach,

    Shutdown,
}

// ── Handle ─────────────────────────────────────────────────────────

/// [`MediaSink`] backed by the default output device.
pub struct RodioSink {
    cmd_tx: mpsc::Sender<SinkCommand>,
    thread: Option<thread::JoinHandle<()>>,
    paused: bool,
}

impl RodioSink {
    /// Open the default output device on a dedicated audio thread.
    pub fn open() -> Result<Self, CliError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SinkCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), CliError>>();

        let thread = thread::Builder::new()
            .name("recall-audio".into())
            .spawn(move || AudioThread::run(cmd_rx, init_tx))
            .map_err(|e| CliError::AudioDevice(format!("failed to spawn audio thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| CliError::AudioDevice("audio thread exited during startup".into()))??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
            paused: true,
        })
    }

    fn send(&self, command: SinkCommand) {
        if self.cmd_tx.send(command).is_err() {
            tracing::warn!("Audio thread is gone; dropping sink command");
        }
    }
}

impl MediaSink for RodioSink {
    fn bind(&mut self, events: SinkEventSender) {
        self.send(SinkCommand::Bind(events));
    }

    fn attach_source(&mut self, source: SourceRef) -> Result<(), SinkError> {
        let SourceRef::Blob { data, mime_type } = source else {
            return Err(SinkError::Media(MediaErrorCode::SourceNotSupported));
        };
        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(SinkCommand::Attach {
                data,
                mime_type,
                reply,
            })
            .map_err(|_| SinkError::Detached)?;
        let result = rx.recv().map_err(|_| SinkError::Detached)?;
        self.paused = true;
        result
    }

    fn detach_source(&mut self) {
        self.paused = true;
        self.send(SinkCommand::Detach);
    }

    fn play(&mut self) -> BoxFuture<'static, Result<(), SinkError>> {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(SinkCommand::Play { reply }).is_err() {
            return futures_util::future::ready(Err(SinkError::Detached)).boxed();
        }
        self.paused = false;
        async move { rx.await.map_err(|_| SinkError::Detached)? }.boxed()
    }

    fn pause(&mut self) {
        self.paused = true;
        self.send(SinkCommand::Pause);
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SinkCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for RodioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioSink")
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

// ── Audio thread ───────────────────────────────────────────────────

/// The attached blob and its completion state.
struct Track {
    sink: Arc<Sink>,
    /// Cleared by `stop`, so the watcher can tell a natural end from a detach.
    live: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    watching: bool,
}

struct AudioThread {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    events: Option<SinkEventSender>,
    track: Option<Track>,
}

impl AudioThread {
    fn run(cmd_rx: mpsc::Receiver<SinkCommand>, init_tx: mpsc::Sender<Result<(), CliError>>) {
        let (stream, handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = init_tx.send(Err(CliError::AudioDevice(e.to_string())));
                return;
            }
        };
        if init_tx.send(Ok(())).is_err() {
            return;
        }
        tracing::info!("Audio output initialized on default device");

        let mut audio = Self {
            _stream: stream,
            handle,
            events: None,
            track: None,
        };

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                SinkCommand::Bind(events) => audio.events = Some(events),
                SinkCommand::Attach {
                    data,
                    mime_type,
                    reply,
                } => {
                    let _ = reply.send(audio.attach(data, &mime_type));
                }
                SinkCommand::Play { reply } => {
                    let _ = reply.send(audio.play());
                }
                SinkCommand::Pause => audio.pause(),
                SinkCommand::Detach => audio.stop(),
                SinkCommand::Shutdown => break,
            }
        }

        audio.stop();
        tracing::debug!("Audio thread shutting down");
    }

    fn emit(&self, event: SinkEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn attach(&mut self, data: Bytes, mime_type: &str) -> Result<(), SinkError> {
        self.stop();

        let bytes = data.len();
        let source = decode(data)?;
        let sink = Sink::try_new(&self.handle).map_err(|e| SinkError::Other(e.to_string()))?;
        sink.pause();
        sink.append(source);

        tracing::debug!(bytes, mime_type, "Audio blob attached");
        self.track = Some(Track {
            sink: Arc::new(sink),
            live: Arc::new(AtomicBool::new(true)),
            playing: Arc::new(AtomicBool::new(false)),
            watching: false,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<(), SinkError> {
        let Some(track) = self.track.as_mut() else {
            return Err(SinkError::Detached);
        };
        track.sink.play();
        track.playing.store(true, Ordering::SeqCst);

        if !track.watching {
            track.watching = true;
            if let Some(events) = self.events.clone() {
                spawn_completion_watcher(track, events);
            }
        }

        self.emit(SinkEvent::Started);
        self.emit(SinkEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let Some(track) = &self.track else {
            return;
        };
        track.sink.pause();
        if track.playing.swap(false, Ordering::SeqCst) {
            self.emit(SinkEvent::Paused);
        }
    }

    fn stop(&mut self) {
        if let Some(track) = self.track.take() {
            track.live.store(false, Ordering::SeqCst);
            track.playing.store(false, Ordering::SeqCst);
            track.sink.stop();
            tracing::debug!("Audio blob detached");
        }
    }
}

/// Block a helper thread until the track drains, then report `Ended`
/// unless the track was stopped first.
fn spawn_completion_watcher(track: &Track, events: SinkEventSender) {
    let sink = Arc::clone(&track.sink);
    let live = Arc::clone(&track.live);
    let playing = Arc::clone(&track.playing);

    let spawned = thread::Builder::new()
        .name("recall-audio-watch".into())
        .spawn(move || {
            sink.sleep_until_end();
            if !live.swap(false, Ordering::SeqCst) {
                return;
            }
            playing.store(false, Ordering::SeqCst);
            tracing::debug!("Playback finished naturally");
            events.emit(SinkEvent::Ended);
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to spawn playback completion watcher");
    }
}

fn decode(data: Bytes) -> Result<Decoder<Cursor<Bytes>>, SinkError> {
    Decoder::new(Cursor::new(data)).map_err(|e| {
        tracing::warn!(error = %e, "Audio blob could not be decoded");
        SinkError::Media(MediaErrorCode::Decode)
    })
}
