use crate::error::{Result, VoiceError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (remote service vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    ///
    /// # Returns
    /// Non-empty transcribed text, [`VoiceError::NoSpeech`] when the audio
    /// held no words, or [`VoiceError::Recognition`] when the service failed.
    fn transcribe(&self, audio: &[i16]) -> Result<String>;

    /// Get the name of the model in use
    fn model_name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across threads.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Trim service output and map blank text to [`VoiceError::NoSpeech`].
pub fn normalize_transcript(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(VoiceError::NoSpeech)
    } else {
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    NoSpeech,
    Fail,
}

/// Mock transcriber for testing
///
/// Replies from a script first, then with the default reply.
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    default: MockReply,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            default: MockReply::Text("mock transcription".to_string()),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.default = MockReply::Text(response.to_string());
        self
    }

    /// Replies returned once each, in order, before the default.
    pub fn with_script(self, responses: &[&str]) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(responses.iter().map(|r| MockReply::Text(r.to_string())));
        }
        self
    }

    /// Report no speech on every call
    pub fn with_no_speech(mut self) -> Self {
        self.default = MockReply::NoSpeech;
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.default = MockReply::Fail;
        self
    }

    /// Number of transcribe calls made on this mock and its clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            MockReply::Text(text) => normalize_transcript(&text),
            MockReply::NoSpeech => Err(VoiceError::NoSpeech),
            MockReply::Fail => Err(VoiceError::recognition("mock transcription failure")),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("next verse");
        assert_eq!(transcriber.transcribe(&[0i16; 1000]).unwrap(), "next verse");
    }

    #[test]
    fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();
        match transcriber.transcribe(&[0i16; 1000]) {
            Err(VoiceError::Recognition { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            other => panic!("Expected Recognition error, got {other:?}"),
        }
    }

    #[test]
    fn test_mock_transcriber_no_speech() {
        let transcriber = MockTranscriber::new("test-model").with_no_speech();
        assert!(matches!(
            transcriber.transcribe(&[]),
            Err(VoiceError::NoSpeech)
        ));
    }

    #[test]
    fn test_blank_response_is_no_speech() {
        let transcriber = MockTranscriber::new("test-model").with_response("   ");
        assert!(matches!(
            transcriber.transcribe(&[0i16; 10]),
            Err(VoiceError::NoSpeech)
        ));
    }

    #[test]
    fn test_script_then_default() {
        let transcriber = MockTranscriber::new("m")
            .with_script(&["hello", "bible clock"])
            .with_response("fallback");
        let observer = transcriber.clone();

        assert_eq!(transcriber.transcribe(&[]).unwrap(), "hello");
        assert_eq!(transcriber.transcribe(&[]).unwrap(), "bible clock");
        assert_eq!(transcriber.transcribe(&[]).unwrap(), "fallback");
        assert_eq!(observer.calls(), 3);
    }

    #[test]
    fn test_normalize_transcript_trims() {
        assert_eq!(normalize_transcript("  Next verse.\n").unwrap(), "Next verse.");
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("test-model").with_response("boxed test"));

        assert_eq!(transcriber.model_name(), "test-model");
        assert_eq!(transcriber.transcribe(&[0i16; 100]).unwrap(), "boxed test");
    }
}
