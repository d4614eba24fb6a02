//! Transcription through an OpenAI-compatible `/audio/transcriptions` endpoint.

use crate::audio::encode_wav;
use crate::config::SttConfig;
use crate::error::{Result, VoiceError};
use crate::stt::transcriber::{Transcriber, normalize_transcript};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Uploads each utterance as a WAV file and returns the recognized text.
pub struct OpenAiTranscriber {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: String,
    sample_rate: u32,
}

impl OpenAiTranscriber {
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(config: &SttConfig, api_key: &str, sample_rate: u32, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(VoiceError::ConfigInvalidValue {
                key: "chat.api_key".to_string(),
                message: "an API key is required for transcription".to_string(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::recognition(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/audio/transcriptions", config.api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            language: config.language.clone(),
            sample_rate,
        })
    }
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio: &[i16]) -> Result<String> {
        if audio.is_empty() {
            return Err(VoiceError::NoSpeech);
        }

        let wav = encode_wav(audio, self.sample_rate)?;
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("command.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::recognition(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                VoiceError::recognition(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(VoiceError::recognition(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .map_err(|e| VoiceError::recognition(format!("invalid transcription response: {e}")))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        normalize_transcript(&result.text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
