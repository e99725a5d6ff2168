#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

mod buffer;
mod cache;
mod controller;
mod machine;
mod negotiate;
mod service;
mod session;
mod transport;

pub use buffer::StreamingBufferController;
pub use cache::AudioCache;
pub use machine::{AUTOPLAY_BLOCKED_MESSAGE, Effect, Transition, Trigger, transition};
pub use negotiate::{FormatNegotiator, StaticFormatProbe, negotiate_format};
pub use service::{AudioPlaybackService, PlaybackDeps};
pub use transport::{decode_chunk, decode_payload};

/// Longest key prefix written to logs.
const LOG_KEY_CHARS: usize = 50;

/// Shorten a text key for log output.
pub(crate) fn log_key(key: &str) -> String {
    match key.char_indices().nth(LOG_KEY_CHARS) {
        Some((cut, _)) => format!("{}...", &key[..cut]),
        None => key.to_string(),
    }
}
