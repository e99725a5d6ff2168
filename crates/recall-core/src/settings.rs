//! Playback settings and validation.
//!
//! These are pure domain types with no infrastructure dependencies; the
//! binary fills them from the environment and CLI flags.

use serde::{Deserialize, Serialize};

use crate::domain::AudioFormat;

/// Default preferred container/codec for streamed speech.
pub const DEFAULT_PREFERRED_FORMAT: &str = "audio/webm; codecs=opus";

/// Default fallback container/codec.
pub const DEFAULT_FALLBACK_FORMAT: &str = "audio/webm; codecs=vorbis";

/// Default number of payloads kept in the audio cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Upper bound accepted for `cache_capacity`.
pub const MAX_CACHE_CAPACITY: usize = 4096;

/// How audio reaches the sink. Chosen once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStrategy {
    /// Live subscription; chunks are appended incrementally.
    #[default]
    Streaming,

    /// Complete payload fetched (and cached) before playback.
    Fetch,
}

impl std::str::FromStr for PlaybackStrategy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streaming" | "stream" => Ok(Self::Streaming),
            "fetch" => Ok(Self::Fetch),
            other => Err(SettingsError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Audio playback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackSettings {
    pub strategy: PlaybackStrategy,

    /// Format tried first during negotiation.
    pub preferred_format: String,

    /// Format tried when the preferred one is unsupported.
    pub fallback_format: Option<String>,

    /// Maximum number of cached payloads (least recently used is evicted).
    pub cache_capacity: usize,

    /// Global audio switch. While off, play requests are ignored.
    pub audio_enabled: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            strategy: PlaybackStrategy::Streaming,
            preferred_format: DEFAULT_PREFERRED_FORMAT.to_string(),
            fallback_format: Some(DEFAULT_FALLBACK_FORMAT.to_string()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            audio_enabled: true,
        }
    }
}

impl PlaybackSettings {
    /// Negotiation candidates, preferred first.
    #[must_use]
    pub fn format_candidates(&self) -> Vec<AudioFormat> {
        std::iter::once(self.preferred_format.as_str())
            .chain(self.fallback_format.as_deref())
            .filter(|f| !f.trim().is_empty())
            .map(AudioFormat::from)
            .collect()
    }

    /// Merge a partial update, only touching fields that are `Some`.
    pub fn merge(&mut self, update: &PlaybackSettingsUpdate) {
        if let Some(strategy) = update.strategy {
            self.strategy = strategy;
        }
        if let Some(ref format) = update.preferred_format {
            self.preferred_format.clone_from(format);
        }
        if let Some(ref fallback) = update.fallback_format {
            self.fallback_format.clone_from(fallback);
        }
        if let Some(capacity) = update.cache_capacity {
            self.cache_capacity = capacity;
        }
        if let Some(enabled) = update.audio_enabled {
            self.audio_enabled = enabled;
        }
    }
}

/// Partial settings update.
///
/// `fallback_format` is `Option<Option<_>>`:
/// - `None` = don't change
/// - `Some(None)` = remove the fallback
/// - `Some(Some(value))` = set it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSettingsUpdate {
    pub strategy: Option<PlaybackStrategy>,
    pub preferred_format: Option<String>,
    pub fallback_format: Option<Option<String>>,
    pub cache_capacity: Option<usize>,
    pub audio_enabled: Option<bool>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Preferred audio format cannot be empty")]
    EmptyPreferredFormat,

    #[error("Cache capacity must be between 1 and {MAX_CACHE_CAPACITY}, got {0}")]
    InvalidCacheCapacity(usize),

    #[error("Unknown playback strategy '{0}' (expected 'streaming' or 'fetch')")]
    UnknownStrategy(String),
}

/// Validate settings before constructing the playback service.
pub fn validate_settings(settings: &PlaybackSettings) -> Result<(), SettingsError> {
    if settings.preferred_format.trim().is_empty() {
        return Err(SettingsError::EmptyPreferredFormat);
    }
    if settings.cache_capacity == 0 || settings.cache_capacity > MAX_CACHE_CAPACITY {
        return Err(SettingsError::InvalidCacheCapacity(settings.cache_capacity));
    }
    Ok(())
}
