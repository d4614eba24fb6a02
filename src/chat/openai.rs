//! OpenAI-compatible `/chat/completions` client with server-sent events.

use crate::chat::{ChatClient, ChatMessage};
use crate::config::ChatConfig;
use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// One parsed SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    /// Comments, keep-alives, role-only chunks.
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| VoiceError::chat(format!("invalid stream chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .find_map(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Delta))
}

pub struct OpenAiChatClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChatClient {
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be built
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| VoiceError::ConfigInvalidValue {
                key: "chat.api_key".to_string(),
                message: "set OPENAI_API_KEY to answer questions".to_string(),
            })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::chat(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

impl ChatClient for OpenAiChatClient {
    fn stream(&self, messages: &[ChatMessage], on_delta: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                VoiceError::chat(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(VoiceError::chat(format!("chat API error {status}")));
        }

        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.map_err(|e| VoiceError::chat(format!("stream read failed: {e}")))?;
            match parse_sse_line(&line)? {
                SseLine::Delta(text) => {
                    if !on_delta(&text) {
                        tracing::debug!("answer no longer wanted, closing stream");
                        return Ok(());
                    }
                }
                SseLine::Done => return Ok(()),
                SseLine::Skip => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"In the"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Delta("In the".to_string()));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_parse_garbage_is_chat_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(VoiceError::Chat { .. })
        ));
    }

    #[test]
    fn test_request_shape() {
        let messages = [ChatMessage::system("be brief"), ChatMessage::user("who wrote Romans?")];
        let request = CompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            max_tokens: 50,
            temperature: 0.5,
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["max_tokens"], 50);
        assert_eq!(value["messages"][1]["content"], "who wrote Romans?");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = ChatConfig::default();
        assert!(matches!(
            OpenAiChatClient::new(&config),
            Err(VoiceError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_endpoint() {
        let config = ChatConfig {
            api_key: Some("sk-test".to_string()),
            ..ChatConfig::default()
        };
        let client = OpenAiChatClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
    }
}
