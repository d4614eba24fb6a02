//! Visual feedback collaborator.

use std::sync::{Arc, Mutex};

/// Receives a state name and message at every state change, for display.
pub trait VisualFeedback: Send + Sync {
    fn update_state(&self, state: &str, message: &str);
}

/// Writes state changes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl VisualFeedback for LogFeedback {
    fn update_state(&self, state: &str, message: &str) {
        tracing::info!(target: "voiceclock::feedback", state, message);
    }
}

/// Keeps every update, for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingFeedback {
    updates: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<String> {
        self.updates
            .lock()
            .map(|u| u.iter().map(|(state, _)| state.clone()).collect())
            .unwrap_or_default()
    }
}

impl VisualFeedback for RecordingFeedback {
    fn update_state(&self, state: &str, message: &str) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((state.to_string(), message.to_string()));
        }
    }
}
