//! Error types for voiceclock.

use thiserror::Error;

/// Coarse error classes that decide how an interaction recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No speech captured or the microphone could not deliver audio.
    /// Recovered with a spoken retry prompt.
    Capture,
    /// Audio was captured but could not be turned into text.
    /// Recovered with a spoken apology.
    Recognition,
    /// The chat-completion collaborator failed.
    /// Surfaced as one spoken error message.
    Answer,
    /// Microphone or speaker could not be opened.
    /// Retried with backoff, then the voice subsystem is disabled.
    Device,
    /// Configuration and plumbing failures.
    Internal,
}

#[derive(Error, Debug)]
pub enum VoiceError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture errors
    #[error("No speech detected")]
    NoSpeech,

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Device errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio device unavailable: {message}")]
    DeviceUnavailable { message: String },

    // Recognition errors
    #[error("Transcription error: {message}")]
    Recognition { message: String },

    // Answer errors
    #[error("Chat completion failed: {message}")]
    Chat { message: String },

    // Output errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Plumbing
    #[error("Channel closed: {name}")]
    ChannelClosed { name: String },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VoiceError {
    /// Classifies the error for recovery decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            VoiceError::NoSpeech | VoiceError::AudioCapture { .. } => ErrorClass::Capture,
            VoiceError::AudioDeviceNotFound { .. } | VoiceError::DeviceUnavailable { .. } => {
                ErrorClass::Device
            }
            VoiceError::Recognition { .. } => ErrorClass::Recognition,
            VoiceError::Chat { .. } => ErrorClass::Answer,
            VoiceError::Synthesis { .. } | VoiceError::Playback { .. } => ErrorClass::Device,
            VoiceError::ConfigParse { .. }
            | VoiceError::ConfigInvalidValue { .. }
            | VoiceError::Config(_)
            | VoiceError::ChannelClosed { .. }
            | VoiceError::InvalidTransition { .. }
            | VoiceError::Io(_)
            | VoiceError::Other(_) => ErrorClass::Internal,
        }
    }

    pub(crate) fn capture(message: impl Into<String>) -> Self {
        VoiceError::AudioCapture {
            message: message.into(),
        }
    }

    pub(crate) fn recognition(message: impl Into<String>) -> Self {
        VoiceError::Recognition {
            message: message.into(),
        }
    }

    pub(crate) fn chat(message: impl Into<String>) -> Self {
        VoiceError::Chat {
            message: message.into(),
        }
    }

    pub(crate) fn synthesis(message: impl Into<String>) -> Self {
        VoiceError::Synthesis {
            message: message.into(),
        }
    }

    pub(crate) fn playback(message: impl Into<String>) -> Self {
        VoiceError::Playback {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_no_speech_display() {
        assert_eq!(VoiceError::NoSpeech.to_string(), "No speech detected");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VoiceError::ConfigInvalidValue {
            key: "recorder.silence_threshold".to_string(),
            message: "must be in (0, 1]".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for recorder.silence_threshold: must be in (0, 1]"
        );
    }

    #[test]
    fn test_audio_device_not_found_display() {
        let error = VoiceError::AudioDeviceNotFound {
            device: "plughw:1,0".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: plughw:1,0");
    }

    #[test]
    fn test_chat_display() {
        assert_eq!(
            VoiceError::chat("timeout").to_string(),
            "Chat completion failed: timeout"
        );
    }

    #[test]
    fn test_classes_follow_taxonomy() {
        assert_eq!(VoiceError::NoSpeech.class(), ErrorClass::Capture);
        assert_eq!(VoiceError::capture("overflow").class(), ErrorClass::Capture);
        assert_eq!(
            VoiceError::recognition("garbled").class(),
            ErrorClass::Recognition
        );
        assert_eq!(VoiceError::chat("502").class(), ErrorClass::Answer);
        assert_eq!(
            VoiceError::DeviceUnavailable {
                message: "busy".to_string()
            }
            .class(),
            ErrorClass::Device
        );
        assert_eq!(VoiceError::playback("aplay").class(), ErrorClass::Device);
        assert_eq!(
            VoiceError::Other("x".to_string()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "piper not found");
        let error: VoiceError = io_error.into();
        assert!(error.to_string().contains("piper not found"));
        assert_eq!(error.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("a = = b").unwrap_err();
        let error: VoiceError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoiceError>();
        assert_sync::<VoiceError>();
    }
}
