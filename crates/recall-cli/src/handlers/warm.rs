//! Warm command handler.
//!
//! Fetches every text through an [`AudioCache`] concurrently and reports
//! what the backend returned. Nothing is played, so no output device is
//! opened.

use futures_util::future::join_all;

use recall_audio::{AudioCache, decode_payload};

use super::preview;
use crate::bootstrap::CliConfig;
use crate::error::CliError;

pub async fn execute(config: &CliConfig, texts: &[String]) -> Result<(), CliError> {
    let cache = AudioCache::new(config.query()?, config.settings.cache_capacity);

    let results = join_all(texts.iter().map(|text| cache.get_or_fetch(text))).await;

    let mut failures = 0usize;
    for (text, result) in texts.iter().zip(results) {
        let label = preview(text, 40);
        match result {
            Ok(payload) => match decode_payload(&payload) {
                Ok(audio) => println!("ok    {label:<44} {} bytes {}", audio.len(), payload.mime_type),
                Err(e) => {
                    failures += 1;
                    println!("bad   {label:<44} {e}");
                }
            },
            Err(e) => {
                failures += 1;
                println!("fail  {label:<44} {e}");
            }
        }
    }

    tracing::debug!(cached = cache.len(), failures, "Warm finished");
    if failures > 0 {
        return Err(CliError::Backend(format!(
            "{failures} of {} text(s) could not be fetched",
            texts.len()
        )));
    }
    Ok(())
}
