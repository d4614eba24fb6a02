//! Trigger phrase detection.
//!
//! [`WakeWordDetector`] turns native-rate microphone frames into classifier
//! frames; the [`TriggerClassifier`] decides whether the phrase was spoken.
//! [`listener`] runs detection on its own thread and reports to the
//! orchestrator, switching to [`FallbackListener`] when the device keeps
//! failing to open.

pub mod detector;
pub mod fallback;
pub mod hybrid;
pub mod listener;

pub use detector::WakeWordDetector;
pub use fallback::FallbackListener;
pub use hybrid::HybridClassifier;
pub use listener::{ListenRequest, ListenerConfig, ListenerHandle, spawn_listener};

use crate::error::{Result, VoiceError};
use std::time::Instant;

/// Decides whether a fixed-length frame completes the trigger phrase.
pub trait TriggerClassifier: Send {
    /// Rate the classifier expects its frames at.
    fn sample_rate(&self) -> u32;

    /// Exact number of samples per call to [`process`](Self::process).
    fn frame_length(&self) -> usize;

    /// Feed one frame. Returns true when the phrase has just been heard.
    fn process(&mut self, frame: &[i16]) -> Result<bool>;

    /// Forget any partial state.
    fn reset(&mut self);
}

/// The trigger phrase was heard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub detected_at: Instant,
    /// Matched phrase, when the classifier knows it.
    pub phrase: Option<String>,
}

impl WakeEvent {
    pub fn now(phrase: Option<String>) -> Self {
        Self {
            detected_at: Instant::now(),
            phrase,
        }
    }
}

/// First phrase contained in `transcript`, ignoring case and punctuation.
pub fn match_phrase<'a>(transcript: &str, phrases: &'a [String]) -> Option<&'a str> {
    let cleaned = normalize(transcript);
    phrases
        .iter()
        .map(String::as_str)
        .find(|phrase| {
            let phrase = normalize(phrase);
            !phrase.is_empty() && cleaned.contains(&phrase)
        })
}

fn normalize(text: &str) -> String {
    let lowered: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scripted classifier for tests: fires on the frame numbers given.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    sample_rate: u32,
    frame_length: usize,
    fire_on: Vec<usize>,
    seen: usize,
}

impl MockClassifier {
    pub fn new(sample_rate: u32, frame_length: usize) -> Self {
        Self {
            sample_rate,
            frame_length,
            fire_on: Vec::new(),
            seen: 0,
        }
    }

    /// Fire on the `n`th processed frame, counting from 1 across resets.
    pub fn firing_on(mut self, frames: &[usize]) -> Self {
        self.fire_on = frames.to_vec();
        self
    }

    pub fn frames_seen(&self) -> usize {
        self.seen
    }
}

impl TriggerClassifier for MockClassifier {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        if frame.len() != self.frame_length {
            return Err(VoiceError::Other(format!(
                "classifier frame of {} samples, expected {}",
                frame.len(),
                self.frame_length
            )));
        }
        self.seen += 1;
        Ok(self.fire_on.contains(&self.seen))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_match_ignores_case_and_punctuation() {
        let list = phrases(&["bible clock"]);
        assert_eq!(match_phrase("Hey, Bible-Clock!", &list), Some("bible clock"));
        assert_eq!(match_phrase("BIBLE   CLOCK.", &list), Some("bible clock"));
    }

    #[test]
    fn test_match_requires_whole_phrase() {
        let list = phrases(&["bible clock"]);
        assert_eq!(match_phrase("bible study", &list), None);
        assert_eq!(match_phrase("", &list), None);
    }

    #[test]
    fn test_first_listed_phrase_wins() {
        let list = phrases(&["bible clock", "bible", "clock"]);
        assert_eq!(match_phrase("the clock on the wall", &list), Some("clock"));
        assert_eq!(match_phrase("bible clock please", &list), Some("bible clock"));
    }

    #[test]
    fn test_blank_phrases_never_match() {
        let list = phrases(&["", "  "]);
        assert_eq!(match_phrase("anything", &list), None);
    }

    #[test]
    fn test_mock_classifier_fires_on_schedule() {
        let mut classifier = MockClassifier::new(16000, 4).firing_on(&[2]);
        assert!(!classifier.process(&[0; 4]).unwrap());
        assert!(classifier.process(&[0; 4]).unwrap());
        assert!(!classifier.process(&[0; 4]).unwrap());
        assert_eq!(classifier.frames_seen(), 3);
    }
}
