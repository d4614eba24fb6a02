//! Default configuration constants for voiceclock.
//!
//! Shared by the config structs and the components that fall back to them
//! when constructed without a config file.

/// Sample rate expected by the trigger classifier and the transcription service.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per trigger-classifier frame at [`SAMPLE_RATE`] (32ms).
pub const WAKE_FRAME_LENGTH: usize = 512;

/// Rates probed, highest first, when the microphone does not report a native rate.
pub const PROBE_SAMPLE_RATES: &[u32] = &[48000, 44100, 32000, 22050, 16000];

/// Rate assumed when probing fails.
pub const FALLBACK_MIC_RATE: u32 = 48000;

/// Bounded wait for one microphone frame.
pub const READ_TIMEOUT_MS: u64 = 500;

/// RMS level (0.0 to 1.0) below which a command frame counts as silence.
///
/// Equivalent to an i16 RMS of ~500, which sits just above USB microphone
/// hiss in a quiet room.
pub const SILENCE_THRESHOLD: f32 = 0.015;

/// Contiguous silence after speech onset that ends a command.
pub const MIN_SILENCE_MS: u32 = 800;

/// Hard cap on command recording length.
pub const MAX_RECORDING_MS: u32 = 10_000;

/// Samples per command-recorder frame at the microphone's native rate.
pub const RECORDER_CHUNK_SIZE: usize = 1024;

/// Primary trigger phrase.
pub const WAKE_PHRASE: &str = "bible clock";

/// Substrings accepted by the transcription-based fallback listener.
pub const FALLBACK_WAKE_PHRASES: &[&str] = &["bible clock", "bible", "clock", "computer"];

/// Length of each clip recorded in fallback mode.
pub const FALLBACK_CLIP_SECS: u32 = 2;

/// RMS level that opens a candidate trigger segment in the hybrid classifier.
pub const WAKE_ENERGY_THRESHOLD: f32 = 0.03;

/// Speech needed before a candidate trigger segment is verified.
pub const WAKE_MIN_SPEECH_MS: u32 = 300;

/// Silence that closes a candidate trigger segment.
pub const WAKE_SEGMENT_SILENCE_MS: u32 = 500;

/// Longest candidate trigger segment; longer speech is cut here and verified as is.
pub const WAKE_MAX_SEGMENT_MS: u32 = 3000;

/// Consecutive microphone open failures before switching to fallback mode.
pub const MAX_OPEN_FAILURES: u32 = 3;

/// First retry delay for device open failures.
pub const RETRY_BASE_MS: u64 = 500;

/// Upper bound for the exponential device retry delay.
pub const RETRY_MAX_MS: u64 = 8000;

/// OpenAI-compatible API base URL.
pub const API_BASE: &str = "https://api.openai.com/v1";

/// Chat model used for questions.
pub const CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Answers are spoken, so they are kept short.
pub const CHAT_MAX_TOKENS: u32 = 50;

pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Client-level timeout for network collaborators.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

pub const SYSTEM_PROMPT: &str = "You are a knowledgeable Bible study assistant. \
Provide accurate, thoughtful responses about the Bible, Christianity, and faith. \
Keep responses very brief (1-2 sentences max), suitable for voice interaction.";

/// Transcription model name for the OpenAI-compatible endpoint.
pub const STT_MODEL: &str = "whisper-1";

pub const STT_LANGUAGE: &str = "en";

/// Piper voice model, relative to the user's data directory.
pub const PIPER_VOICE: &str = "piper/voices/en_US-amy-medium.onnx";

/// Piper speaking speed; below 1.0 is faster.
pub const PIPER_LENGTH_SCALE: f32 = 0.85;

pub const PIPER_NOISE_SCALE: f32 = 0.667;

/// Pause between sentences in synthesized audio, in seconds.
pub const PIPER_SENTENCE_SILENCE: f32 = 0.2;

/// Voice used by the OpenAI-compatible speech endpoint.
pub const OPENAI_VOICE: &str = "nova";

pub const OPENAI_TTS_MODEL: &str = "tts-1";

/// ALSA device for the USB speaker.
pub const SPEAKER_DEVICE: &str = "plughw:2,0";

/// ALSA device used by the fallback clip recorder.
pub const CLIP_DEVICE: &str = "plughw:1,0";

/// Playback binary for the aplay backend.
pub const APLAY_PROGRAM: &str = "aplay";

/// Spoken when a command contained no speech.
pub const NO_SPEECH_PROMPT: &str = "I didn't hear anything. Please try again.";

/// Spoken when captured audio could not be transcribed.
pub const RECOGNITION_APOLOGY: &str =
    "Sorry, I couldn't understand that. Please try speaking more clearly.";

/// Spoken when the chat collaborator fails.
pub const ANSWER_APOLOGY: &str =
    "I'm sorry, I encountered an error processing your question.";

/// Spoken when a question arrives without an API key configured.
pub const MISSING_API_KEY: &str =
    "I need an OpenAI API key to answer questions. Please configure it in your environment.";

pub const HELP_TEXT: &str = "I can help with Bible questions, verses, and basic commands. \
Try asking: What does John 3:16 say? Or say next verse, previous verse, or what time is it.";

pub const NO_CURRENT_ITEM: &str = "No verse is currently displayed.";

pub const NO_ITEM_TO_EXPLAIN: &str = "No verse is currently displayed to explain.";

/// Spoken for content commands when no content collaborator is attached.
pub const CONTENT_UNAVAILABLE: &str = "Verse manager not available.";

/// Spoken for the status command when host load cannot be sampled.
pub const STATUS_UNKNOWN: &str = "System is running normally.";
