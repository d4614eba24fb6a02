//! Composition root.
//!
//! Builds every collaborator from [`Config`] and wires them to one control
//! channel: microphone → wake listener → orchestrator → dispatcher →
//! speech queue → speaker.

use crate::audio::{AplayPlayer, AudioSource, MissingSource, Player, SharedMicrophone, WavAudioSource};
use crate::chat::{ChatClient, OpenAiChatClient};
use crate::config::{Config, PlaybackBackend};
use crate::defaults;
use crate::dispatch::{ContentContext, ContentItem, Dispatcher, LogFeedback, StaticContent, VisualFeedback};
use crate::error::{Result, VoiceError};
use crate::interrupt::InterruptMonitor;
use crate::orchestrator::{Components, ControlChannel, Orchestrator};
use crate::recorder::CommandRecorder;
use crate::speech_queue::SpeechQueue;
use crate::stt::{OpenAiTranscriber, Transcriber};
use crate::tts;
use crate::wake::{FallbackListener, HybridClassifier, ListenerConfig, WakeWordDetector, spawn_listener};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Silence appended to replayed files so the last command can close.
const REPLAY_TRAILING_SILENCE_MS: u32 = 1500;

/// How long one-shot commands wait for their speech to finish.
const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(120);

/// Items shown when no display application supplies content.
pub fn sample_content() -> StaticContent {
    StaticContent::new(vec![
        ContentItem::new(
            "John 3:16",
            "For God so loved the world, that he gave his only begotten Son",
        ),
        ContentItem::new("Psalm 23:1", "The Lord is my shepherd; I shall not want."),
        ContentItem::new(
            "Philippians 4:13",
            "I can do all things through Christ which strengtheneth me.",
        ),
    ])
}

/// Open the configured microphone.
///
/// A device that cannot be opened is not fatal: the returned placeholder
/// fails every start and the wake listener falls back from there.
pub fn open_microphone(config: &Config) -> Box<dyn AudioSource> {
    #[cfg(feature = "cpal-audio")]
    {
        match crate::audio::capture::CpalAudioSource::new(
            config.audio.device.as_deref(),
            config.audio.sample_rate,
        ) {
            Ok(source) => Box::new(source),
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable at startup");
                Box::new(MissingSource::new(
                    config.audio.sample_rate.unwrap_or(defaults::FALLBACK_MIC_RATE),
                    e.to_string(),
                ))
            }
        }
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        match &config.audio.device {
            Some(device) => Box::new(crate::audio::ArecordSource::new(
                device.clone(),
                config.audio.sample_rate.unwrap_or(defaults::FALLBACK_MIC_RATE),
            )),
            None => Box::new(MissingSource::new(
                config.audio.sample_rate.unwrap_or(defaults::FALLBACK_MIC_RATE),
                "no capture backend compiled in; set audio.device for arecord",
            )),
        }
    }
}

fn aplay(config: &Config) -> AplayPlayer {
    AplayPlayer::new(config.audio.speaker_device.clone()).with_program(&config.playback.aplay_path)
}

pub fn open_player(config: &Config) -> Box<dyn Player> {
    match config.playback.backend {
        PlaybackBackend::Aplay => Box::new(aplay(config)),
        #[cfg(feature = "cpal-audio")]
        PlaybackBackend::Cpal => Box::new(crate::audio::playback::CpalPlayer),
        #[cfg(not(feature = "cpal-audio"))]
        PlaybackBackend::Cpal => {
            tracing::warn!("cpal playback not compiled in, using aplay");
            Box::new(aplay(config))
        }
    }
}

/// Transcription is required for wake verification and commands alike.
pub fn build_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let key = config.chat.api_key.as_deref().unwrap_or_default();
    let transcriber = OpenAiTranscriber::new(
        &config.stt,
        key,
        config.recorder.target_sample_rate,
        Duration::from_secs(config.chat.timeout_secs),
    )?;
    Ok(Arc::new(transcriber))
}

/// `None` without an API key, so questions get the configuration hint.
pub fn build_chat(config: &Config) -> Option<Arc<dyn ChatClient>> {
    match OpenAiChatClient::new(&config.chat) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "questions will not be answered");
            None
        }
    }
}

pub fn build_dispatcher(config: &Config, content: Option<Arc<dyn ContentContext>>) -> Dispatcher {
    Dispatcher::new(config.chat.system_prompt.clone(), content, build_chat(config))
}

fn read_timeout(config: &Config) -> Duration {
    Duration::from_millis(config.audio.read_timeout_ms)
}

fn wake_detector(config: &Config, transcriber: &Arc<dyn Transcriber>) -> WakeWordDetector {
    WakeWordDetector::new(Box::new(HybridClassifier::new(&config.wake, Arc::clone(transcriber))))
        .with_read_timeout(read_timeout(config))
}

/// Wire the full assistant around `source`.
pub fn build_assistant(
    config: &Config,
    source: Box<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    dispatcher: Dispatcher,
    feedback: Arc<dyn VisualFeedback>,
) -> Result<Orchestrator> {
    config.validate()?;
    let channel = ControlChannel::new();
    let mic = SharedMicrophone::new(source);

    let speech = SpeechQueue::spawn(tts::from_config(config)?, open_player(config), Some(channel.sender()))?;

    let detector = wake_detector(config, &transcriber);
    let interrupt = InterruptMonitor::new(wake_detector(config, &transcriber), config.interrupt.enabled);
    let fallback = FallbackListener::new(&config.wake, Arc::clone(&transcriber))
        .with_read_timeout(read_timeout(config));
    let listener = spawn_listener(
        mic.clone(),
        detector,
        fallback,
        interrupt,
        ListenerConfig::from_wake(&config.wake),
        channel.sender(),
    )?;

    let components = Components {
        mic,
        recorder: CommandRecorder::new(config.recorder.clone(), read_timeout(config)),
        transcriber,
        dispatcher,
        feedback,
        interrupt_enabled: config.interrupt.enabled,
    };
    Ok(Orchestrator::new(components, speech, listener, channel))
}

/// Assistant on the configured microphone.
pub fn live_assistant(config: &Config, content: Option<Arc<dyn ContentContext>>) -> Result<Orchestrator> {
    let feedback: Arc<dyn VisualFeedback> = Arc::new(LogFeedback);
    feedback.update_state("initializing", "Starting voice control");
    let transcriber = build_transcriber(config)?;
    build_assistant(
        config,
        open_microphone(config),
        transcriber,
        build_dispatcher(config, content),
        feedback,
    )
}

/// Assistant fed from a WAV file instead of the microphone. Stops when the
/// file has been consumed and all speech has played.
pub fn replay_assistant(
    config: &Config,
    path: &Path,
    content: Option<Arc<dyn ContentContext>>,
) -> Result<Orchestrator> {
    let source = WavAudioSource::from_path(path)?.with_trailing_silence(REPLAY_TRAILING_SILENCE_MS);
    tracing::info!(path = %path.display(), samples = source.len(), "replaying recording");
    build_assistant(
        config,
        Box::new(source),
        build_transcriber(config)?,
        build_dispatcher(config, content),
        Arc::new(LogFeedback),
    )
}

/// Speak one line through the synthesis queue and wait for it.
pub fn say(config: &Config, text: &str) -> Result<()> {
    let speech = SpeechQueue::spawn(tts::from_config(config)?, open_player(config), None)?;
    speech.enqueue(text, true)?;
    let finished = speech.wait_idle(ONE_SHOT_TIMEOUT);
    speech.shutdown();
    if finished {
        Ok(())
    } else {
        Err(VoiceError::Other("timed out waiting for speech".to_string()))
    }
}

/// Dispatch typed text as if it had been spoken, and play the response.
pub fn ask(config: &Config, text: &str, content: Option<Arc<dyn ContentContext>>) -> Result<()> {
    let dispatcher = build_dispatcher(config, content);
    let speech = SpeechQueue::spawn(tts::from_config(config)?, open_player(config), None)?;
    let outcome = dispatcher.dispatch(text, &speech, speech.generation())?;
    tracing::info!(?outcome, "dispatched");
    let finished = speech.wait_idle(ONE_SHOT_TIMEOUT);
    speech.shutdown();
    if finished {
        Ok(())
    } else {
        Err(VoiceError::Other("timed out waiting for speech".to_string()))
    }
}
