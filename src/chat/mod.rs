//! Streaming chat-completion collaborator.

pub mod openai;
pub mod segmenter;

pub use openai::OpenAiChatClient;
pub use segmenter::SentenceSegmenter;

use crate::error::{Result, VoiceError};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Streams an answer as incremental text deltas.
pub trait ChatClient: Send + Sync {
    /// Call `on_delta` for each fragment in arrival order. Returning false
    /// from the callback stops reading the stream.
    fn stream(&self, messages: &[ChatMessage], on_delta: &mut dyn FnMut(&str) -> bool) -> Result<()>;
}

impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    fn stream(&self, messages: &[ChatMessage], on_delta: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        (**self).stream(messages, on_delta)
    }
}

/// Chat client that replays fixed deltas, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChatClient {
    deltas: Vec<String>,
    fail_after: Option<usize>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedChatClient {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Fail with a chat error after delivering `count` deltas.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Messages of every request made, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ChatClient for ScriptedChatClient {
    fn stream(&self, messages: &[ChatMessage], on_delta: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        for (index, delta) in self.deltas.iter().enumerate() {
            if self.fail_after == Some(index) {
                return Err(VoiceError::chat("scripted stream failure"));
            }
            if !on_delta(delta) {
                return Ok(());
            }
        }
        if self.fail_after.is_some_and(|n| n >= self.deltas.len()) {
            return Err(VoiceError::chat("scripted stream failure"));
        }
        Ok(())
    }
}
