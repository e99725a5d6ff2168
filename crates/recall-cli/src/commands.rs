//! Subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play each text in order, prefetching the next while the current one plays
    Play {
        /// Texts to speak
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Fetch audio for the given texts without playing it
    Warm {
        /// Texts to prefetch
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Show which audio format would be negotiated
    Formats,
}
