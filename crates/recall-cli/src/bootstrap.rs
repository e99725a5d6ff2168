//! CLI bootstrap: the composition root.
//!
//! This is the only place where concrete adapters are wired into the
//! playback engine:
//! - `HttpAudioClient` as the audio query port
//! - `RodioSink` as the media sink
//! - `StaticFormatProbe` listing what rodio can decode
//!
//! The CLI always runs the fetch strategy. rodio plays complete blobs and
//! has no incremental buffer to stream into.

use std::sync::Arc;
use std::time::Duration;

use recall_audio::{AudioPlaybackService, PlaybackDeps, StaticFormatProbe};
use recall_core::{
    FormatProbe, PlaybackSettings, PlaybackSettingsUpdate, PlaybackStrategy, validate_settings,
};

use crate::error::CliError;
use crate::http::HttpAudioClient;
use crate::parser::Cli;
use crate::sink::RodioSink;

/// MIME types the bundled rodio decoders handle.
pub const RODIO_FORMATS: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
];

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub settings: PlaybackSettings,
}

impl CliConfig {
    /// Build and validate the configuration from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.timeout_secs == 0 {
            return Err(CliError::Config("--timeout must be at least 1 second".into()));
        }
        let fallback = cli.fallback_format.trim();
        let mut settings = PlaybackSettings::default();
        settings.merge(&PlaybackSettingsUpdate {
            strategy: Some(PlaybackStrategy::Fetch),
            preferred_format: Some(cli.format.clone()),
            fallback_format: Some((!fallback.is_empty()).then(|| fallback.to_string())),
            cache_capacity: Some(cli.cache_capacity),
            audio_enabled: None,
        });
        validate_settings(&settings).map_err(|e| CliError::Config(e.to_string()))?;

        Ok(Self {
            api_url: cli.api_url.clone(),
            request_timeout: Duration::from_secs(cli.timeout_secs),
            settings,
        })
    }

    pub fn query(&self) -> Result<Arc<HttpAudioClient>, CliError> {
        HttpAudioClient::new(&self.api_url, self.request_timeout).map(Arc::new)
    }
}

/// Format probe for the local decoders.
pub fn format_probe() -> Arc<dyn FormatProbe> {
    Arc::new(StaticFormatProbe::new(RODIO_FORMATS))
}

/// Fully composed context for the `play` command.
#[derive(Debug)]
pub struct CliContext {
    pub service: AudioPlaybackService,
    pub config: CliConfig,
}

impl CliContext {
    /// Stop playback and release the output device.
    pub async fn shutdown(self) {
        self.service.shutdown().await;
    }
}

/// Open the output device and start the playback engine.
pub fn bootstrap(config: CliConfig) -> Result<CliContext, CliError> {
    let sink = RodioSink::open()?;
    let deps = PlaybackDeps {
        query: config.query()?,
        stream: None,
        buffers: None,
        probe: format_probe(),
        sink: Box::new(sink),
    };
    let service = AudioPlaybackService::spawn(config.settings.clone(), deps)?;
    tracing::debug!(api_url = %config.api_url, "CLI context ready");
    Ok(CliContext { service, config })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("recall").chain(args.iter().copied()))
    }

    #[test]
    fn builds_fetch_settings_from_args() {
        let cli = parse(&["--format", "audio/wav", "--cache-capacity", "8", "formats"]);
        let config = CliConfig::from_cli(&cli).unwrap();
        assert_eq!(config.settings.strategy, PlaybackStrategy::Fetch);
        assert_eq!(config.settings.preferred_format, "audio/wav");
        assert_eq!(config.settings.cache_capacity, 8);
        assert_eq!(config.settings.fallback_format.as_deref(), Some("audio/wav"));
        assert!(config.settings.audio_enabled);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn blank_fallback_is_dropped() {
        let cli = parse(&["--fallback-format", " ", "formats"]);
        let config = CliConfig::from_cli(&cli).unwrap();
        assert_eq!(config.settings.fallback_format, None);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let zero_cache = parse(&["--cache-capacity", "0", "formats"]);
        assert!(matches!(CliConfig::from_cli(&zero_cache), Err(CliError::Config(_))));

        let zero_timeout = parse(&["--timeout", "0", "formats"]);
        assert!(matches!(CliConfig::from_cli(&zero_timeout), Err(CliError::Config(_))));
    }

    #[test]
    fn probe_accepts_rodio_formats_only() {
        let probe = format_probe();
        assert!(probe.is_supported("audio/mpeg"));
        assert!(probe.is_supported("Audio/WAV"));
        assert!(!probe.is_supported("audio/webm; codecs=opus"));
    }
}
