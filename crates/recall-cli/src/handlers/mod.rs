//! Command handlers.
//!
//! Handlers are thin: they drive the playback engine or the audio cache and
//! format the outcome for the terminal. Engine failures come back as
//! [`CliError`](crate::error::CliError) so `main` can pick an exit code.

pub mod formats;
pub mod play;
pub mod warm;

/// Shorten `text` for one-line terminal output.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("Grüße aus Köln", 5), "Grüße...");
        assert_eq!(preview("kurz", 10), "kurz");
    }
}
