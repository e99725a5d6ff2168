//! Play command handler.
//!
//! Plays each text in order. While one text plays, the next is warmed in
//! the engine's cache so it starts without a backend round trip. Ctrl-C
//! stops playback.

use tokio::sync::watch;

use recall_core::{PlaybackError, PlaybackState, PlaybackStatus};

use super::preview;
use crate::bootstrap::CliContext;
use crate::error::CliError;

pub async fn execute(ctx: &CliContext, texts: &[String]) -> Result<(), CliError> {
    // The engine ignores blank text without publishing anything.
    check_texts(texts)?;
    let service = &ctx.service;
    let mut status = service.status();

    for (idx, text) in texts.iter().enumerate() {
        // Only statuses published after this play request count.
        let _ = status.borrow_and_update();
        service.play(text.as_str())?;
        if let Some(next) = texts.get(idx + 1) {
            service.warm_cache(next.as_str())?;
        }

        let settled = tokio::select! {
            settled = wait_until_settled(&mut status, text) => settled?,
            _ = tokio::signal::ctrl_c() => {
                service.stop()?;
                println!("Stopped.");
                return Ok(());
            }
        };

        let label = preview(text, 60);
        match settled.state {
            PlaybackState::Finished => println!("Played: {label}"),
            PlaybackState::Idle => println!("Stopped: {label}"),
            _ => {
                let message = settled
                    .error_message
                    .unwrap_or_else(|| format!("playback ended in state {}", settled.state));
                return Err(CliError::Playback(message));
            }
        }
    }
    Ok(())
}

fn check_texts(texts: &[String]) -> Result<(), CliError> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(idx) => Err(CliError::Arguments(format!(
            "text #{} is empty",
            idx + 1
        ))),
        None => Ok(()),
    }
}

/// Wait for the first settled status that belongs to `text`.
///
/// An idle status without any text also counts: nothing is playing, so
/// there is nothing left to wait for.
async fn wait_until_settled(
    status: &mut watch::Receiver<PlaybackStatus>,
    text: &str,
) -> Result<PlaybackStatus, CliError> {
    loop {
        status
            .changed()
            .await
            .map_err(|_| PlaybackError::ServiceClosed)?;
        let current = status.borrow_and_update().clone();
        tracing::debug!(state = %current.state, "Playback status");
        let ours = match current.current_text.as_deref() {
            Some(current_text) => current_text == text,
            None => current.state == PlaybackState::Idle,
        };
        if ours && current.state.is_settled() {
            return Ok(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn waits_for_settled_status_of_the_requested_text() {
        let (tx, mut rx) = watch::channel(PlaybackStatus::idle());
        let _ = rx.borrow_and_update();

        let waiter = tokio::spawn(async move { wait_until_settled(&mut rx, "zwei").await });

        for status in [
            PlaybackStatus::for_text(PlaybackState::Finished, "eins"),
            PlaybackStatus::for_text(PlaybackState::Loading, "zwei"),
            PlaybackStatus::for_text(PlaybackState::Playing, "zwei"),
            PlaybackStatus::for_text(PlaybackState::Finished, "zwei"),
        ] {
            tx.send(status).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let settled = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(settled.state, PlaybackState::Finished);
        assert_eq!(settled.current_text.as_deref(), Some("zwei"));
    }

    #[tokio::test]
    async fn idle_outcome_of_the_requested_text_settles() {
        let (tx, mut rx) = watch::channel(PlaybackStatus::idle());
        let _ = rx.borrow_and_update();

        let waiter = tokio::spawn(async move { wait_until_settled(&mut rx, "eins").await });

        // Superseding a previous session goes idle under its text first.
        for status in [
            PlaybackStatus::for_text(PlaybackState::Idle, "null"),
            PlaybackStatus::for_text(PlaybackState::Initializing, "eins"),
            PlaybackStatus::for_text(PlaybackState::Idle, "eins"),
        ] {
            tx.send(status).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let settled = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(settled.state, PlaybackState::Idle);
        assert_eq!(settled.current_text.as_deref(), Some("eins"));
    }

    #[tokio::test]
    async fn idle_without_text_settles() {
        let (tx, mut rx) = watch::channel(PlaybackStatus::idle());
        let _ = rx.borrow_and_update();
        tx.send(PlaybackStatus::for_text(PlaybackState::Loading, "eins"))
            .unwrap();
        tx.send(PlaybackStatus::idle()).unwrap();

        let settled = tokio::time::timeout(
            Duration::from_secs(1),
            wait_until_settled(&mut rx, "eins"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(settled, PlaybackStatus::idle());
    }

    #[test]
    fn blank_texts_are_rejected_before_playback() {
        let texts = vec!["eins".to_string(), "   ".to_string()];
        let err = check_texts(&texts).unwrap_err();
        assert!(matches!(err, CliError::Arguments(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "Invalid arguments: text #2 is empty");

        assert!(check_texts(&["eins".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn closed_service_is_reported() {
        let (tx, mut rx) = watch::channel(PlaybackStatus::idle());
        drop(tx);
        let err = wait_until_settled(&mut rx, "eins").await.unwrap_err();
        assert_eq!(err.to_string(), "Playback service is not running");
    }
}
