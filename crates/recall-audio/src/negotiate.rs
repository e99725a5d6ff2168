//! Capability negotiation: picks the audio format the runtime can decode.
//!
//! Candidates are tried in order (preferred first, then fallback). The
//! outcome, including "nothing supported", is memoized for the lifetime of
//! the negotiator: decoder capabilities do not change within a process.

use std::sync::{Arc, OnceLock};

use recall_core::{AudioFormat, FormatProbe};

/// Return the first candidate the probe accepts.
pub fn negotiate_format(candidates: &[AudioFormat], probe: &dyn FormatProbe) -> Option<AudioFormat> {
    for (idx, candidate) in candidates.iter().enumerate() {
        if probe.is_supported(candidate.as_str()) {
            if idx == 0 {
                tracing::info!(format = %candidate, "Using preferred audio format");
            } else {
                tracing::info!(format = %candidate, "Using fallback audio format");
            }
            return Some(candidate.clone());
        }
        tracing::warn!(format = %candidate, "Audio format not supported by runtime");
    }
    tracing::error!(
        candidates = candidates.len(),
        "No supported audio format found"
    );
    None
}

/// Memoizing wrapper around [`negotiate_format`].
pub struct FormatNegotiator {
    candidates: Vec<AudioFormat>,
    probe: Arc<dyn FormatProbe>,
    selected: OnceLock<Option<AudioFormat>>,
}

impl FormatNegotiator {
    pub fn new(candidates: Vec<AudioFormat>, probe: Arc<dyn FormatProbe>) -> Self {
        Self {
            candidates,
            probe,
            selected: OnceLock::new(),
        }
    }

    /// The negotiated format, probing the runtime on first call only.
    pub fn select_format(&self) -> Option<&AudioFormat> {
        self.selected
            .get_or_init(|| negotiate_format(&self.candidates, self.probe.as_ref()))
            .as_ref()
    }

    pub fn candidates(&self) -> &[AudioFormat] {
        &self.candidates
    }
}

/// Probe answering from a fixed list of decodable formats.
///
/// Suits runtimes whose decoders are known at build time. Matching ignores
/// ASCII case and whitespace around parameters.
#[derive(Debug, Clone, Default)]
pub struct StaticFormatProbe {
    supported: Vec<String>,
}

impl StaticFormatProbe {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            supported: formats.into_iter().map(|f| normalize(f.as_ref())).collect(),
        }
    }
}

fn normalize(format: &str) -> String {
    format
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
        .to_ascii_lowercase()
}

impl FormatProbe for StaticFormatProbe {
    fn is_supported(&self, format: &str) -> bool {
        let wanted = normalize(format);
        self.supported.iter().any(|f| *f == wanted)
    }
}

impl std::fmt::Debug for FormatNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatNegotiator")
            .field("candidates", &self.candidates)
            .field("selected", &self.selected.get())
            .finish_non_exhaustive()
    }
}
