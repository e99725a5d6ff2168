//! Formats command handler.
//!
//! Shows which configured format the local decoders accept and which one
//! playback would use.

use recall_audio::negotiate_format;
use recall_core::{FormatProbe, PlaybackError, PlaybackSettings};

use crate::bootstrap::{CliConfig, RODIO_FORMATS, format_probe};
use crate::error::CliError;

pub fn execute(config: &CliConfig) -> Result<(), CliError> {
    let probe = format_probe();
    let candidates = config.settings.format_candidates();

    println!("Decodable formats: {}", RODIO_FORMATS.join(", "));
    println!();
    for (idx, candidate) in candidates.iter().enumerate() {
        let role = if idx == 0 { "preferred" } else { "fallback" };
        let verdict = if probe.is_supported(candidate.as_str()) {
            "supported"
        } else {
            "not supported"
        };
        println!("{role:<10} {:<28} {verdict}", candidate.as_str());
    }
    println!();

    let selected = select(&config.settings, probe.as_ref())?;
    println!("Selected: {selected}");
    Ok(())
}

fn select(settings: &PlaybackSettings, probe: &dyn FormatProbe) -> Result<String, CliError> {
    negotiate_format(&settings.format_candidates(), probe)
        .map(|format| format.to_string())
        .ok_or_else(|| PlaybackError::UnsupportedFormat.into())
}

#[cfg(test)]
mod tests {
    use recall_audio::StaticFormatProbe;

    use super::*;

    fn settings(preferred: &str, fallback: Option<&str>) -> PlaybackSettings {
        PlaybackSettings {
            preferred_format: preferred.into(),
            fallback_format: fallback.map(Into::into),
            ..PlaybackSettings::default()
        }
    }

    #[test]
    fn falls_back_when_preferred_is_not_decodable() {
        let probe = StaticFormatProbe::new(["audio/wav"]);
        let selected = select(&settings("audio/ogg", Some("audio/wav")), &probe).unwrap();
        assert_eq!(selected, "audio/wav");
    }

    #[test]
    fn nothing_decodable_is_a_playback_error() {
        let probe = StaticFormatProbe::new(["audio/wav"]);
        let err = select(&settings("audio/ogg", None), &probe).unwrap_err();
        assert_eq!(err.to_string(), "No supported audio format available");
        assert_eq!(err.exit_code(), 1);
    }
}
