//! Text-to-speech collaborators.

pub mod openai;
pub mod piper;

pub use openai::OpenAiSynthesizer;
pub use piper::PiperSynthesizer;

use crate::config::{Config, TtsEngine};
use crate::defaults;
use crate::error::{Result, VoiceError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Turns text into a playable WAV clip.
pub trait Synthesizer: Send {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Build the configured synthesizer.
pub fn from_config(config: &Config) -> Result<Box<dyn Synthesizer>> {
    match config.tts.engine {
        TtsEngine::Piper => Ok(Box::new(PiperSynthesizer::new(&config.tts))),
        TtsEngine::OpenAi => {
            let key = config.chat.api_key.as_deref().unwrap_or_default();
            // The default voice is a Piper model path
            let voice = if config.tts.voice.ends_with(".onnx") {
                defaults::OPENAI_VOICE
            } else {
                config.tts.voice.as_str()
            };
            Ok(Box::new(OpenAiSynthesizer::new(
                &config.chat.api_base,
                key,
                voice,
                Duration::from_secs(config.chat.timeout_secs),
            )?))
        }
    }
}

/// Test synthesizer that records the texts it was given and returns them as
/// the clip bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordingSynthesizer {
    texts: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail synthesis for texts containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Texts synthesized so far, in order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Synthesizer for RecordingSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Some(needle) = &self.fail_on
            && text.contains(needle.as_str())
        {
            return Err(VoiceError::synthesis("mock synthesis failure"));
        }
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        Ok(text.as_bytes().to_vec())
    }
}
