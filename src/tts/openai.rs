//! Synthesis through an OpenAI-compatible `/audio/speech` endpoint.

use crate::defaults;
use crate::error::{Result, VoiceError};
use crate::tts::Synthesizer;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSynthesizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSynthesizer {
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(api_base: &str, api_key: &str, voice: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(VoiceError::ConfigInvalidValue {
                key: "chat.api_key".to_string(),
                message: "an API key is required for the openai speech engine".to_string(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::synthesis(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/audio/speech", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: defaults::OPENAI_TTS_MODEL.to_string(),
            voice: voice.to_string(),
        })
    }

    fn request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        }
    }
}

impl Synthesizer for OpenAiSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(text))
            .send()
            .map_err(|e| VoiceError::synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech API error");
            return Err(VoiceError::synthesis(format!("speech API error {status}")));
        }

        let bytes = response
            .bytes()
            .map_err(|e| VoiceError::synthesis(format!("failed to read speech audio: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        assert!(OpenAiSynthesizer::new(defaults::API_BASE, "", "nova", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_request_body() {
        let synth =
            OpenAiSynthesizer::new("http://localhost:9000/v1/", "sk-test", "nova", Duration::from_secs(5))
                .unwrap();
        assert_eq!(synth.endpoint, "http://localhost:9000/v1/audio/speech");

        let body = serde_json::to_value(synth.request("Hello.")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "tts-1",
                "input": "Hello.",
                "voice": "nova",
                "response_format": "wav"
            })
        );
    }
}
