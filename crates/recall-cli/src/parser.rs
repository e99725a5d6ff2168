//! Root CLI structure and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line player for synthesized speech.
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Play synthesized speech from the recall backend")]
#[command(version)]
pub struct Cli {
    /// Base URL of the speech backend
    #[arg(
        long = "api-url",
        env = "RECALL_API_URL",
        default_value = "http://localhost:8000",
        global = true
    )]
    pub api_url: String,

    /// Preferred audio format (MIME type) to negotiate
    #[arg(
        long = "format",
        env = "RECALL_AUDIO_FORMAT",
        default_value = "audio/mpeg",
        global = true
    )]
    pub format: String,

    /// Fallback audio format, tried when the preferred one is not decodable
    #[arg(long = "fallback-format", default_value = "audio/wav", global = true)]
    pub fallback_format: String,

    /// Number of payloads kept in the audio cache
    #[arg(
        long = "cache-capacity",
        env = "RECALL_CACHE_CAPACITY",
        default_value_t = recall_core::DEFAULT_CACHE_CAPACITY,
        global = true
    )]
    pub cache_capacity: usize,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout", default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
