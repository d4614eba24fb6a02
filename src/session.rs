//! Voice interaction state machine and the control messages that drive it.
//!
//! [`transition`] is pure: the orchestrator feeds it the current state and
//! an event and applies whatever it returns. Messages from the listener,
//! the speech worker and dispatch threads arrive as [`ControlEvent`]s on a
//! single channel.

use crate::dispatch::DispatchOutcome;
use crate::error::{Result, VoiceError};
use crate::metrics::InteractionMetrics;
use crate::wake::WakeEvent;
use std::fmt;

/// Where the current interaction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    WakeDetected,
    Recording,
    Transcribing,
    Dispatching,
    LocalResponse,
    StreamingAnswer,
    Speaking,
    /// Voice input could not be started; nothing leaves this state.
    Disabled,
}

impl VoiceState {
    /// Name shown by the visual feedback collaborator.
    pub fn name(self) -> &'static str {
        match self {
            VoiceState::Idle => "listening",
            VoiceState::WakeDetected => "wake_detected",
            VoiceState::Recording => "recording",
            VoiceState::Transcribing | VoiceState::Dispatching | VoiceState::LocalResponse => {
                "processing"
            }
            VoiceState::StreamingAnswer => "thinking",
            VoiceState::Speaking => "speaking",
            VoiceState::Disabled => "error",
        }
    }

    /// States that belong to an interaction in progress.
    pub fn is_active(self) -> bool {
        !matches!(self, VoiceState::Idle | VoiceState::Disabled)
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Wake,
    RecordingStarted,
    CommandCaptured,
    Transcribed,
    MatchedBuiltin,
    AskedQuestion,
    SpeechStarted,
    /// Everything for this interaction has been spoken.
    Finished,
    /// Trigger phrase heard during playback.
    Interrupt,
    /// Recoverable error; the spoken prompt plays outside the interaction.
    Failed,
    Disable,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Next state for `event` in `state`.
pub fn transition(state: VoiceState, event: SessionEvent) -> Result<VoiceState> {
    use SessionEvent as E;
    use VoiceState as S;

    let next = match (state, event) {
        (S::Disabled, _) => None,
        (_, E::Disable) => Some(S::Disabled),

        (S::Idle, E::Wake) => Some(S::WakeDetected),
        (S::WakeDetected, E::RecordingStarted) => Some(S::Recording),
        (S::Recording, E::CommandCaptured) => Some(S::Transcribing),
        (S::Transcribing, E::Transcribed) => Some(S::Dispatching),
        (S::Dispatching, E::MatchedBuiltin) => Some(S::LocalResponse),
        (S::Dispatching, E::AskedQuestion) => Some(S::StreamingAnswer),
        (S::LocalResponse | S::StreamingAnswer | S::Speaking, E::SpeechStarted) => {
            Some(S::Speaking)
        }
        (S::LocalResponse | S::StreamingAnswer | S::Speaking, E::Finished) => Some(S::Idle),
        (S::Speaking, E::Interrupt) => Some(S::Recording),
        (state, E::Failed) if state.is_active() => Some(S::Idle),
        _ => None,
    };

    next.ok_or_else(|| VoiceError::InvalidTransition {
        from: state.to_string(),
        event: event.to_string(),
    })
}

/// Messages into the orchestrator.
#[derive(Debug)]
pub enum ControlEvent {
    WakeDetected(WakeEvent),
    InterruptDetected(WakeEvent),
    /// Voice input cannot be used; the rest of the process keeps running.
    VoiceDisabled { reason: String },
    /// A finite input source ran dry.
    InputEnded,
    /// The speech worker began playing a job from `generation`.
    SpeechStarted { generation: u64 },
    /// The speech queue has nothing left to play.
    QueueIdle { generation: u64 },
    /// First streamed answer text for `generation`.
    FirstToken { generation: u64 },
    DispatchDone {
        generation: u64,
        outcome: DispatchOutcome,
    },
    Shutdown,
}

/// One voice turn, from wake to the last spoken word. Never persisted.
#[derive(Debug, Clone)]
pub struct InteractionSession {
    pub generation: u64,
    pub wake: Option<WakeEvent>,
    pub transcript: Option<String>,
    pub outcome: Option<DispatchOutcome>,
    pub metrics: InteractionMetrics,
}

impl InteractionSession {
    pub fn new(generation: u64, wake: Option<WakeEvent>) -> Self {
        let mut metrics = InteractionMetrics::default();
        if let Some(event) = &wake {
            metrics.mark_wake(event.detected_at);
        }
        Self {
            generation,
            wake,
            transcript: None,
            outcome: None,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(events: &[SessionEvent]) -> Result<VoiceState> {
        events
            .iter()
            .try_fold(VoiceState::Idle, |state, &event| transition(state, event))
    }

    #[test]
    fn test_builtin_command_path() {
        use SessionEvent::*;
        let state = walk(&[
            Wake,
            RecordingStarted,
            CommandCaptured,
            Transcribed,
            MatchedBuiltin,
            SpeechStarted,
            Finished,
        ])
        .unwrap();
        assert_eq!(state, VoiceState::Idle);
    }

    #[test]
    fn test_streamed_answer_speaks_repeatedly() {
        use SessionEvent::*;
        let state = walk(&[
            Wake,
            RecordingStarted,
            CommandCaptured,
            Transcribed,
            AskedQuestion,
            SpeechStarted,
            SpeechStarted,
            SpeechStarted,
        ])
        .unwrap();
        assert_eq!(state, VoiceState::Speaking);
    }

    #[test]
    fn test_interrupt_goes_straight_to_recording() {
        assert_eq!(
            transition(VoiceState::Speaking, SessionEvent::Interrupt).unwrap(),
            VoiceState::Recording
        );
    }

    #[test]
    fn test_interrupt_only_while_speaking() {
        for state in [VoiceState::Idle, VoiceState::Recording, VoiceState::StreamingAnswer] {
            assert!(transition(state, SessionEvent::Interrupt).is_err());
        }
    }

    #[test]
    fn test_failure_returns_to_idle() {
        for state in [
            VoiceState::WakeDetected,
            VoiceState::Recording,
            VoiceState::Transcribing,
            VoiceState::Dispatching,
            VoiceState::StreamingAnswer,
        ] {
            assert_eq!(transition(state, SessionEvent::Failed).unwrap(), VoiceState::Idle);
        }
        assert!(transition(VoiceState::Idle, SessionEvent::Failed).is_err());
    }

    #[test]
    fn test_cannot_skip_stages() {
        assert!(transition(VoiceState::Idle, SessionEvent::CommandCaptured).is_err());
        assert!(transition(VoiceState::Recording, SessionEvent::Transcribed).is_err());
        assert!(transition(VoiceState::WakeDetected, SessionEvent::Wake).is_err());
    }

    #[test]
    fn test_disabled_is_terminal() {
        let state = transition(VoiceState::Recording, SessionEvent::Disable).unwrap();
        assert_eq!(state, VoiceState::Disabled);
        assert!(transition(state, SessionEvent::Wake).is_err());
        assert!(transition(state, SessionEvent::Disable).is_err());
    }

    #[test]
    fn test_invalid_transition_error_names_both_sides() {
        let err = transition(VoiceState::Idle, SessionEvent::SpeechStarted).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Idle on SpeechStarted"
        );
    }

    #[test]
    fn test_visual_names() {
        assert_eq!(VoiceState::Idle.name(), "listening");
        assert_eq!(VoiceState::StreamingAnswer.name(), "thinking");
        assert_eq!(VoiceState::Transcribing.name(), "processing");
        assert_eq!(VoiceState::Disabled.name(), "error");
    }
}
