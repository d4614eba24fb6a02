use crate::defaults;
use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub recorder: RecorderConfig,
    pub stt: SttConfig,
    pub chat: ChatConfig,
    pub tts: TtsConfig,
    pub playback: PlaybackConfig,
    pub interrupt: InterruptConfig,
}

/// Microphone and speaker selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` picks a USB microphone, then any input.
    pub device: Option<String>,
    /// Native microphone rate; `None` probes the device.
    pub sample_rate: Option<u32>,
    pub speaker_device: String,
    pub read_timeout_ms: u64,
}

/// Trigger phrase detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeConfig {
    pub phrases: Vec<String>,
    pub fallback_phrases: Vec<String>,
    pub sample_rate: u32,
    pub frame_length: usize,
    pub energy_threshold: f32,
    pub fallback_clip_secs: u32,
    pub clip_device: String,
    pub max_open_failures: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

/// Command capture with silence cutoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    pub silence_threshold: f32,
    pub min_silence_ms: u32,
    pub max_recording_ms: u32,
    pub chunk_size: usize,
    pub target_sample_rate: u32,
}

/// Speech-to-text collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub api_base: String,
    pub model: String,
    pub language: String,
}

/// Chat-completion collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base: String,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

/// Speech synthesis engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    Piper,
    OpenAi,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: TtsEngine,
    /// Piper `.onnx` voice path or OpenAI voice name, depending on `engine`.
    pub voice: String,
    pub length_scale: f32,
    pub noise_scale: f32,
    pub sentence_silence: f32,
}

/// Playback backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackBackend {
    Aplay,
    Cpal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub backend: PlaybackBackend,
    /// aplay binary for the aplay backend
    pub aplay_path: String,
}

/// Barge-in while speaking. Off by default: many USB audio setups cannot
/// hold the microphone open while the speaker plays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct InterruptConfig {
    pub enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: None,
            speaker_device: defaults::SPEAKER_DEVICE.to_string(),
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: vec![defaults::WAKE_PHRASE.to_string()],
            fallback_phrases: defaults::FALLBACK_WAKE_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            sample_rate: defaults::SAMPLE_RATE,
            frame_length: defaults::WAKE_FRAME_LENGTH,
            energy_threshold: defaults::WAKE_ENERGY_THRESHOLD,
            fallback_clip_secs: defaults::FALLBACK_CLIP_SECS,
            clip_device: defaults::CLIP_DEVICE.to_string(),
            max_open_failures: defaults::MAX_OPEN_FAILURES,
            retry_base_ms: defaults::RETRY_BASE_MS,
            retry_max_ms: defaults::RETRY_MAX_MS,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            silence_threshold: defaults::SILENCE_THRESHOLD,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            max_recording_ms: defaults::MAX_RECORDING_MS,
            chunk_size: defaults::RECORDER_CHUNK_SIZE,
            target_sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::API_BASE.to_string(),
            model: defaults::STT_MODEL.to_string(),
            language: defaults::STT_LANGUAGE.to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::API_BASE.to_string(),
            api_key: None,
            model: defaults::CHAT_MODEL.to_string(),
            max_tokens: defaults::CHAT_MAX_TOKENS,
            temperature: defaults::CHAT_TEMPERATURE,
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        let voice = dirs::data_dir()
            .map(|dir| dir.join(defaults::PIPER_VOICE))
            .unwrap_or_else(|| PathBuf::from(defaults::PIPER_VOICE));
        Self {
            engine: TtsEngine::Piper,
            voice: voice.display().to_string(),
            length_scale: defaults::PIPER_LENGTH_SCALE,
            noise_scale: defaults::PIPER_NOISE_SCALE,
            sentence_silence: defaults::PIPER_SENTENCE_SILENCE,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            backend: PlaybackBackend::Aplay,
            aplay_path: defaults::APLAY_PROGRAM.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file is missing.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OPENAI_API_KEY → chat.api_key
    /// - VOICECLOCK_CHAT_MODEL → chat.model
    /// - VOICECLOCK_MAX_TOKENS → chat.max_tokens
    /// - VOICECLOCK_AUDIO_DEVICE → audio.device
    /// - VOICECLOCK_SPEAKER_DEVICE → audio.speaker_device
    /// - VOICECLOCK_INTERRUPT → interrupt.enabled ("true"/"1")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.chat.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("VOICECLOCK_CHAT_MODEL")
            && !model.is_empty()
        {
            self.chat.model = model;
        }

        if let Ok(tokens) = std::env::var("VOICECLOCK_MAX_TOKENS") {
            match tokens.parse() {
                Ok(value) => self.chat.max_tokens = value,
                Err(_) => tracing::warn!(value = %tokens, "ignoring invalid VOICECLOCK_MAX_TOKENS"),
            }
        }

        if let Ok(device) = std::env::var("VOICECLOCK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(device) = std::env::var("VOICECLOCK_SPEAKER_DEVICE")
            && !device.is_empty()
        {
            self.audio.speaker_device = device;
        }

        if let Ok(flag) = std::env::var("VOICECLOCK_INTERRUPT") {
            self.interrupt.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| VoiceError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let threshold = self.recorder.silence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid("recorder.silence_threshold", "must be in (0, 1]"));
        }
        if self.recorder.min_silence_ms == 0 {
            return Err(invalid("recorder.min_silence_ms", "must be positive"));
        }
        if self.recorder.min_silence_ms >= self.recorder.max_recording_ms {
            return Err(invalid(
                "recorder.min_silence_ms",
                "must be shorter than recorder.max_recording_ms",
            ));
        }
        if self.recorder.chunk_size == 0 {
            return Err(invalid("recorder.chunk_size", "must be positive"));
        }
        if self.recorder.target_sample_rate == 0 || self.wake.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if self.audio.sample_rate == Some(0) {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.wake.frame_length == 0 {
            return Err(invalid("wake.frame_length", "must be positive"));
        }
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(invalid("wake.phrases", "at least one phrase is required"));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(invalid("chat.temperature", "must be in [0, 2]"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voiceclock/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voiceclock")
            .join("config.toml")
    }
}
