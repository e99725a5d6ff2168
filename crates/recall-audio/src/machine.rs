//! Playback state machine: a pure `(status, trigger) -> transition` function.
//!
//! ```text
//!   Idle ──play──▶ Initializing ──source open──▶ Buffering ──playing──▶ Playing
//!     ▲  (fetch)─▶ Loading ─────────────────────────────────playing──▶   │ ▲
//!     │                                                    waiting ◀─────┘ │
//!     │                                                    paused ──resume─┘
//!     └──stop── {any active state}            ended ──▶ Finished
//!                                             failure ─▶ Error (sticky)
//!                                             no codec ▶ Unsupported (sticky)
//! ```
//!
//! Going idle keeps `current_text`, so a caller waiting on a request can
//! tell that its own session was the one that stopped.
//!
//! Every update is guarded on the current state so that a late or less
//! authoritative event cannot clobber a more authoritative one. Side effects
//! are returned as [`Effect`]s and executed by the controller, which keeps
//! this module testable without any sink or buffer.

use recall_core::{PlaybackState, PlaybackStatus, PlaybackStrategy};

use PlaybackState::{
    Buffering, Error, Finished, Idle, Initializing, Loading, Paused, Playing, Unsupported,
};

/// Message attached when the sink refuses to start (autoplay policy).
pub const AUTOPLAY_BLOCKED_MESSAGE: &str = "Playback paused (autoplay blocked?).";

/// Something that happened to the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A new session was created for `key`.
    Started {
        key: String,
        strategy: PlaybackStrategy,
    },
    /// No decodable format; the request is refused.
    Unsupported { message: String },
    /// The playback buffer is open and accepting data.
    SourceOpened,
    SinkPlaying,
    /// The sink is starved (`waiting` or `stalled`).
    SinkWaiting,
    SinkPaused,
    SinkEnded,
    /// The playback buffer was closed underneath the session.
    SourceClosed,
    /// The sink refused `play()`.
    PlayRejected { message: String },
    /// Unrecoverable failure.
    Failed { message: String },
    /// Transport was cancelled before any audio arrived.
    CancelledBeforeData,
    /// Explicit stop (user request or supersession).
    Stopped,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Release every resource held by the session.
    Teardown,
    /// Ask the sink to start playback.
    AttemptPlay,
}

/// Result of applying a [`Trigger`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transition {
    /// New status, or `None` when the trigger is ignored in this state.
    pub status: Option<PlaybackStatus>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn ignore() -> Self {
        Self::default()
    }

    fn to(status: PlaybackStatus) -> Self {
        Self {
            status: Some(status),
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Compute the transition for `trigger` from `current`.
pub fn transition(current: &PlaybackStatus, trigger: Trigger) -> Transition {
    let state = current.state;
    match trigger {
        Trigger::Started { key, strategy } => {
            let initial = match strategy {
                PlaybackStrategy::Streaming => Initializing,
                PlaybackStrategy::Fetch => Loading,
            };
            Transition::to(PlaybackStatus::for_text(initial, key))
        }

        Trigger::Unsupported { message } => {
            Transition::to(current.with_message(Unsupported, message)).with(Effect::Teardown)
        }

        Trigger::SourceOpened => match state {
            Initializing => Transition::to(current.with_state(Buffering)).with(Effect::AttemptPlay),
            _ => Transition::ignore(),
        },

        Trigger::SinkPlaying => match state {
            Initializing | Loading | Buffering | Paused => {
                Transition::to(current.with_state(Playing))
            }
            _ => Transition::ignore(),
        },

        Trigger::SinkWaiting => match state {
            Playing | Initializing => Transition::to(current.with_state(Buffering)),
            _ => Transition::ignore(),
        },

        Trigger::SinkPaused => match state {
            Playing | Buffering => Transition::to(current.with_state(Paused)),
            _ => Transition::ignore(),
        },

        Trigger::SinkEnded => {
            if state.is_terminal() || state == Idle {
                Transition::ignore()
            } else {
                Transition::to(current.with_state(Finished)).with(Effect::Teardown)
            }
        }

        Trigger::SourceClosed => {
            if state.is_settled() {
                Transition::ignore()
            } else {
                Transition::to(current.with_state(Idle)).with(Effect::Teardown)
            }
        }

        Trigger::PlayRejected { message } => match state {
            Loading | Buffering | Playing => {
                Transition::to(current.with_message(Paused, message))
            }
            _ => Transition::ignore(),
        },

        Trigger::Failed { message } => {
            // An unsupported verdict is more specific than any later failure.
            if state == Unsupported {
                Transition::ignore().with(Effect::Teardown)
            } else {
                Transition::to(current.with_message(Error, message)).with(Effect::Teardown)
            }
        }

        Trigger::CancelledBeforeData => {
            if state.is_settled() {
                Transition::ignore().with(Effect::Teardown)
            } else {
                Transition::to(current.with_state(Idle)).with(Effect::Teardown)
            }
        }

        Trigger::Stopped => {
            if state.is_settled() {
                Transition::ignore().with(Effect::Teardown)
            } else {
                Transition::to(current.with_state(Idle)).with(Effect::Teardown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(state: PlaybackState) -> PlaybackStatus {
        PlaybackStatus::for_text(state, "hello")
    }

    fn next_state(state: PlaybackState, trigger: Trigger) -> Option<PlaybackState> {
        transition(&at(state), trigger).status.map(|s| s.state)
    }

    #[test]
    fn start_picks_initial_state_per_strategy() {
        let t = transition(
            &PlaybackStatus::idle(),
            Trigger::Started {
                key: "k".into(),
                strategy: PlaybackStrategy::Streaming,
            },
        );
        let status = t.status.unwrap();
        assert_eq!(status.state, Initializing);
        assert_eq!(status.current_text.as_deref(), Some("k"));

        let t = transition(
            &at(Error),
            Trigger::Started {
                key: "k".into(),
                strategy: PlaybackStrategy::Fetch,
            },
        );
        assert_eq!(t.status.unwrap().state, Loading);
    }

    #[test]
    fn source_open_moves_to_buffering_and_attempts_play() {
        let t = transition(&at(Initializing), Trigger::SourceOpened);
        assert_eq!(t.status.unwrap().state, Buffering);
        assert_eq!(t.effects, vec![Effect::AttemptPlay]);

        assert_eq!(transition(&at(Playing), Trigger::SourceOpened), Transition::default());
    }

    #[test]
    fn waiting_only_from_playing_or_initializing() {
        assert_eq!(next_state(Playing, Trigger::SinkWaiting), Some(Buffering));
        assert_eq!(next_state(Initializing, Trigger::SinkWaiting), Some(Buffering));
        assert_eq!(next_state(Paused, Trigger::SinkWaiting), None);
        assert_eq!(next_state(Loading, Trigger::SinkWaiting), None);
    }

    #[test]
    fn pause_only_from_playing_or_buffering() {
        assert_eq!(next_state(Playing, Trigger::SinkPaused), Some(Paused));
        assert_eq!(next_state(Buffering, Trigger::SinkPaused), Some(Paused));
        assert_eq!(next_state(Idle, Trigger::SinkPaused), None);
        assert_eq!(next_state(Finished, Trigger::SinkPaused), None);
    }

    #[test]
    fn ended_overrides_active_states_and_tears_down() {
        for state in [Buffering, Playing, Paused, Loading, Initializing] {
            let t = transition(&at(state), Trigger::SinkEnded);
            assert_eq!(t.status.unwrap().state, Finished, "from {state}");
            assert_eq!(t.effects, vec![Effect::Teardown]);
        }
    }

    #[test]
    fn terminal_states_ignore_sink_events() {
        for state in [Error, Unsupported] {
            for trigger in [
                Trigger::SinkWaiting,
                Trigger::SinkPaused,
                Trigger::SinkEnded,
                Trigger::SinkPlaying,
                Trigger::SourceOpened,
            ] {
                assert_eq!(
                    next_state(state, trigger.clone()),
                    None,
                    "{trigger:?} moved {state} away"
                );
            }
        }
    }

    #[test]
    fn failure_sets_error_message_and_tears_down() {
        let t = transition(
            &at(Playing),
            Trigger::Failed {
                message: "Audio buffer full.".into(),
            },
        );
        let status = t.status.unwrap();
        assert_eq!(status.state, Error);
        assert_eq!(status.error_message.as_deref(), Some("Audio buffer full."));
        assert_eq!(status.current_text.as_deref(), Some("hello"));
        assert_eq!(t.effects, vec![Effect::Teardown]);
    }

    #[test]
    fn failure_does_not_mask_unsupported() {
        let t = transition(
            &at(Unsupported),
            Trigger::Failed {
                message: "x".into(),
            },
        );
        assert!(t.status.is_none());
        assert_eq!(t.effects, vec![Effect::Teardown]);
    }

    #[test]
    fn stop_retains_settled_states() {
        for state in [Idle, Error, Unsupported, Finished] {
            let t = transition(&at(state), Trigger::Stopped);
            assert!(t.status.is_none(), "stop changed {state}");
            assert_eq!(t.effects, vec![Effect::Teardown]);
        }
        for state in [Initializing, Loading, Buffering, Playing, Paused] {
            let status = transition(&at(state), Trigger::Stopped).status.unwrap();
            assert_eq!(status, at(Idle), "from {state}");
        }
    }

    #[test]
    fn rejected_play_pauses_with_message() {
        let t = transition(
            &at(Buffering),
            Trigger::PlayRejected {
                message: AUTOPLAY_BLOCKED_MESSAGE.into(),
            },
        );
        let status = t.status.unwrap();
        assert_eq!(status.state, Paused);
        assert_eq!(status.error_message.as_deref(), Some(AUTOPLAY_BLOCKED_MESSAGE));
    }

    #[test]
    fn cancellation_before_data_returns_to_idle() {
        assert_eq!(
            transition(&at(Initializing), Trigger::CancelledBeforeData).status,
            Some(at(Idle))
        );
    }

    #[test]
    fn source_close_returns_active_session_to_idle() {
        assert_eq!(next_state(Buffering, Trigger::SourceClosed), Some(Idle));
        // The text stays so observers can tell which request went idle.
        let status = transition(&at(Playing), Trigger::SourceClosed).status.unwrap();
        assert_eq!(status.current_text.as_deref(), Some("hello"));
        assert!(status.error_message.is_none());
        assert_eq!(next_state(Finished, Trigger::SourceClosed), None);
    }

    #[test]
    fn resume_from_paused_to_playing() {
        assert_eq!(next_state(Paused, Trigger::SinkPlaying), Some(Playing));
        assert_eq!(next_state(Finished, Trigger::SinkPlaying), None);
    }
}
