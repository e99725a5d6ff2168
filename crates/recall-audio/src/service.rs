//! `AudioPlaybackService`: the handle callers hold.
//!
//! The service owns the controller task. Every method is non-blocking: it
//! enqueues a command and returns. Outcomes are observed on the status
//! channel returned by [`AudioPlaybackService::status`].

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use recall_core::{
    AudioQueryPort, AudioStreamPort, FormatProbe, MediaSink, PlaybackBufferFactory, PlaybackError,
    PlaybackSettings, PlaybackStatus, PlaybackStrategy, validate_settings,
};

use crate::cache::AudioCache;
use crate::controller::{Command, Input, PlaybackController};

/// Adapters the engine runs on.
///
/// `stream` and `buffers` are only needed by the streaming strategy.
pub struct PlaybackDeps {
    pub query: Arc<dyn AudioQueryPort>,
    pub stream: Option<Arc<dyn AudioStreamPort>>,
    pub buffers: Option<Arc<dyn PlaybackBufferFactory>>,
    pub probe: Arc<dyn FormatProbe>,
    pub sink: Box<dyn MediaSink>,
}

impl std::fmt::Debug for PlaybackDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDeps")
            .field("stream", &self.stream.is_some())
            .field("buffers", &self.buffers.is_some())
            .finish_non_exhaustive()
    }
}

/// Client-side audio playback engine.
pub struct AudioPlaybackService {
    commands: mpsc::UnboundedSender<Input>,
    status: watch::Receiver<PlaybackStatus>,
    cache: AudioCache,
    task: Option<JoinHandle<()>>,
}

impl AudioPlaybackService {
    /// Validate `settings`, then start the controller on the current runtime.
    pub fn spawn(settings: PlaybackSettings, deps: PlaybackDeps) -> Result<Self, PlaybackError> {
        validate_settings(&settings).map_err(|e| PlaybackError::Config(e.to_string()))?;
        if settings.strategy == PlaybackStrategy::Streaming
            && (deps.stream.is_none() || deps.buffers.is_none())
        {
            return Err(PlaybackError::Config(
                "streaming strategy requires a stream port and a buffer factory".into(),
            ));
        }

        let (commands, inputs) = mpsc::unbounded_channel();
        let controller = PlaybackController::new(&settings, deps, commands.clone());
        let status = controller.subscribe();
        let cache = controller.cache().clone();
        let task = tokio::spawn(controller.run(inputs));

        tracing::info!(
            strategy = ?settings.strategy,
            preferred_format = %settings.preferred_format,
            cache_capacity = settings.cache_capacity,
            "Audio playback service started"
        );
        Ok(Self {
            commands,
            status,
            cache,
            task: Some(task),
        })
    }

    fn send(&self, command: Command) -> Result<(), PlaybackError> {
        self.commands
            .send(Input::Command(command))
            .map_err(|_| PlaybackError::ServiceClosed)
    }

    /// Play the audio for `key`, superseding any other playback.
    ///
    /// Calling again with the key that is already loading or playing is a
    /// no-op; calling it while that key is paused resumes it.
    pub fn play(&self, key: impl Into<String>) -> Result<(), PlaybackError> {
        self.send(Command::Play(key.into()))
    }

    /// Stop playback. A settled status (`finished`, `error`, ...) is kept.
    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.send(Command::Stop)
    }

    /// Fetch `key` into the cache in the background. Failures are logged.
    pub fn warm_cache(&self, key: impl Into<String>) -> Result<(), PlaybackError> {
        self.send(Command::WarmCache(key.into()))
    }

    /// Drop every cached payload.
    pub fn clear_cache(&self) {
        self.cache.invalidate();
    }

    /// Global audio switch. Turning it off stops the current playback.
    pub fn set_audio_enabled(&self, enabled: bool) -> Result<(), PlaybackError> {
        self.send(Command::SetAudioEnabled(enabled))
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    pub const fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// Stop playback and wait for the controller to release the sink.
    pub async fn shutdown(mut self) {
        let _ = self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Playback controller task failed");
            }
        }
    }
}

impl Drop for AudioPlaybackService {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.send(Command::Shutdown);
        }
    }
}

impl std::fmt::Debug for AudioPlaybackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPlaybackService")
            .field("status", &*self.status.borrow())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
