//! voiceclock - voice control for a verse clock
//!
//! Wake word, command capture with silence cutoff, built-in commands and
//! streamed chat answers spoken through a single serialized speech queue.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod chat;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod interrupt;
pub mod metrics;
pub mod orchestrator;
pub mod recorder;
pub mod session;
pub mod speech_queue;
pub mod stt;
pub mod tts;
pub mod wake;

// Collaborator traits
pub use audio::{AudioSource, Player};
pub use chat::ChatClient;
pub use dispatch::{ContentContext, VisualFeedback};
pub use speech_queue::SpeechSink;
pub use stt::Transcriber;
pub use tts::Synthesizer;
pub use wake::TriggerClassifier;

// Control loop
pub use orchestrator::{Components, ControlChannel, Orchestrator, ShutdownHandle, StopReason};
pub use session::{ControlEvent, SessionEvent, VoiceState, transition};

// Core components
pub use dispatch::{DispatchOutcome, Dispatcher, Route};
pub use interrupt::InterruptMonitor;
pub use metrics::{InteractionMetrics, MetricsSummary};
pub use recorder::{CommandRecorder, CommandUtterance};
pub use speech_queue::{SpeechQueue, TtsJob};
pub use wake::{WakeEvent, WakeWordDetector};

// Error handling
pub use error::{ErrorClass, Result, VoiceError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", hash_part);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
