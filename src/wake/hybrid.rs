//! Energy-gated trigger verification.
//!
//! An energy gate segments the stream into candidate utterances; each
//! segment with enough speech in it is sent to the transcriber and checked
//! for a trigger phrase. Cheap while the room is quiet, accurate when it is
//! not.

use crate::audio::{Vad, VadConfig, VadDecision};
use crate::config::WakeConfig;
use crate::defaults;
use crate::error::{Result, VoiceError};
use crate::stt::Transcriber;
use crate::wake::{TriggerClassifier, match_phrase};
use std::sync::Arc;

pub struct HybridClassifier {
    transcriber: Arc<dyn Transcriber>,
    phrases: Vec<String>,
    sample_rate: u32,
    frame_length: usize,
    vad: Vad,
    segment: Vec<i16>,
    min_speech_samples: u64,
}

impl HybridClassifier {
    pub fn new(config: &WakeConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        let vad = Vad::new(
            VadConfig {
                speech_threshold: config.energy_threshold,
                silence_duration_ms: defaults::WAKE_SEGMENT_SILENCE_MS,
                max_duration_ms: defaults::WAKE_MAX_SEGMENT_MS,
            },
            config.sample_rate,
        );
        Self {
            transcriber,
            phrases: config.phrases.clone(),
            sample_rate: config.sample_rate,
            frame_length: config.frame_length,
            vad,
            segment: Vec::new(),
            min_speech_samples: u64::from(config.sample_rate)
                * u64::from(defaults::WAKE_MIN_SPEECH_MS)
                / 1000,
        }
    }

    fn verify_segment(&mut self) -> bool {
        if self.vad.speech_samples() < self.min_speech_samples {
            tracing::trace!(samples = self.segment.len(), "segment too short to verify");
            return false;
        }

        match self.transcriber.transcribe(&self.segment) {
            Ok(text) => match match_phrase(&text, &self.phrases) {
                Some(phrase) => {
                    tracing::debug!(%phrase, transcript = %text, "trigger phrase verified");
                    true
                }
                None => {
                    tracing::debug!(transcript = %text, "segment is not a trigger phrase");
                    false
                }
            },
            Err(VoiceError::NoSpeech) => false,
            Err(e) => {
                tracing::warn!(error = %e, "trigger verification failed");
                false
            }
        }
    }
}

impl TriggerClassifier for HybridClassifier {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        let finished = match self.vad.process(frame) {
            VadDecision::Discard => {
                // Quiet room: keep the segment clock from running
                self.vad.reset();
                false
            }
            VadDecision::Keep => {
                self.segment.extend_from_slice(frame);
                false
            }
            VadDecision::End | VadDecision::Cap => {
                if self.vad.speech_started() {
                    self.segment.extend_from_slice(frame);
                }
                true
            }
        };

        if !finished {
            return Ok(false);
        }
        let detected = self.verify_segment();
        self.reset();
        Ok(detected)
    }

    fn reset(&mut self) {
        self.vad.reset();
        self.segment.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::MockTranscriber;

    const FRAME: usize = 512;

    fn classifier(transcriber: MockTranscriber) -> HybridClassifier {
        HybridClassifier::new(&WakeConfig::default(), Arc::new(transcriber))
    }

    /// Feed `frames` frames of constant `level`, returning whether any fired.
    fn feed(classifier: &mut HybridClassifier, level: i16, frames: usize) -> bool {
        let frame = vec![level; FRAME];
        let mut fired = false;
        for _ in 0..frames {
            fired |= classifier.process(&frame).unwrap();
        }
        fired
    }

    #[test]
    fn test_silence_never_calls_transcriber() {
        let transcriber = MockTranscriber::new("m").with_response("bible clock");
        let mut hybrid = classifier(transcriber.clone());

        assert!(!feed(&mut hybrid, 0, 500));
        assert_eq!(transcriber.calls(), 0);
    }

    #[test]
    fn test_spoken_phrase_is_detected_after_pause() {
        let transcriber = MockTranscriber::new("m").with_response("Bible clock.");
        let mut hybrid = classifier(transcriber.clone());

        // ~0.6s of speech, then enough silence to close the segment
        assert!(!feed(&mut hybrid, 3000, 19));
        assert!(feed(&mut hybrid, 0, 20));
        assert_eq!(transcriber.calls(), 1);
    }

    #[test]
    fn test_other_speech_is_rejected() {
        let transcriber = MockTranscriber::new("m").with_response("what a lovely day");
        let mut hybrid = classifier(transcriber.clone());

        assert!(!feed(&mut hybrid, 3000, 19));
        assert!(!feed(&mut hybrid, 0, 20));
        assert_eq!(transcriber.calls(), 1);
    }

    #[test]
    fn test_short_blip_is_not_verified() {
        let transcriber = MockTranscriber::new("m").with_response("bible clock");
        let mut hybrid = classifier(transcriber.clone());

        // One frame (32ms) is below the minimum speech length
        assert!(!feed(&mut hybrid, 3000, 1));
        assert!(!feed(&mut hybrid, 0, 20));
        assert_eq!(transcriber.calls(), 0);
    }

    #[test]
    fn test_transcriber_failure_is_not_a_detection() {
        let transcriber = MockTranscriber::new("m").with_failure();
        let mut hybrid = classifier(transcriber);

        assert!(!feed(&mut hybrid, 3000, 19));
        assert!(!feed(&mut hybrid, 0, 20));
    }

    #[test]
    fn test_long_segment_is_capped_and_verified() {
        let transcriber = MockTranscriber::new("m").with_response("bible clock");
        let mut hybrid = classifier(transcriber.clone());

        // Continuous speech past the 3s segment cap
        assert!(feed(&mut hybrid, 3000, 100));
        assert!(transcriber.calls() >= 1);
    }
}
