//! Low-duty-cycle trigger detection used when the primary microphone path
//! keeps failing.
//!
//! Records short fixed-length clips and asks the transcriber whether any of
//! the fallback phrases was said. Slower to react than the streaming
//! detector, but needs nothing beyond a working capture command.

use crate::audio::{AudioSource, FrameRead, FrameReader, calculate_rms, resample};
use crate::config::WakeConfig;
use crate::defaults;
use crate::error::{Result, VoiceError};
use crate::stt::Transcriber;
use crate::wake::detector::ListenOutcome;
use crate::wake::{WakeEvent, match_phrase};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct FallbackListener {
    transcriber: Arc<dyn Transcriber>,
    phrases: Vec<String>,
    clip_secs: u32,
    transcribe_rate: u32,
    silence_threshold: f32,
    read_timeout: Duration,
}

impl FallbackListener {
    pub fn new(config: &WakeConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            transcriber,
            phrases: config.fallback_phrases.clone(),
            clip_secs: config.fallback_clip_secs.max(1),
            transcribe_rate: config.sample_rate,
            silence_threshold: defaults::SILENCE_THRESHOLD,
            read_timeout: Duration::from_millis(defaults::READ_TIMEOUT_MS),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Record one clip. Returns fewer samples than requested only when the
    /// source ran dry or `cancel` was raised.
    fn record_clip(&self, source: &mut dyn AudioSource, cancel: &AtomicBool) -> Result<Vec<i16>> {
        let rate = source.sample_rate();
        let wanted = (rate * self.clip_secs) as usize;
        let mut reader = FrameReader::new((rate / 10).max(1) as usize, self.read_timeout);
        let mut clip = Vec::with_capacity(wanted);

        while clip.len() < wanted && !cancel.load(Ordering::SeqCst) {
            match reader.read_frame(source)? {
                FrameRead::Frame(frame) => clip.extend_from_slice(frame.samples()),
                FrameRead::TimedOut => continue,
                FrameRead::Exhausted => break,
            }
        }
        clip.truncate(wanted);
        Ok(clip)
    }

    /// Transcribe a clip and look for a fallback phrase in it.
    pub fn check_clip(&self, clip: &[i16], sample_rate: u32) -> Option<String> {
        if calculate_rms(clip) < self.silence_threshold {
            return None;
        }

        let audio = resample(clip, sample_rate, self.transcribe_rate);
        match self.transcriber.transcribe(&audio) {
            Ok(text) => {
                tracing::debug!(transcript = %text, "fallback clip transcribed");
                match_phrase(&text, &self.phrases).map(str::to_string)
            }
            Err(VoiceError::NoSpeech) => None,
            Err(e) => {
                tracing::warn!(error = %e, "fallback clip transcription failed");
                None
            }
        }
    }

    /// Record and check clips until a phrase is heard.
    pub fn listen(&self, source: &mut dyn AudioSource, cancel: &AtomicBool) -> Result<ListenOutcome> {
        let rate = source.sample_rate();
        let wanted = (rate * self.clip_secs) as usize;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(ListenOutcome::Cancelled);
            }

            let clip = self.record_clip(source, cancel)?;
            if cancel.load(Ordering::SeqCst) {
                return Ok(ListenOutcome::Cancelled);
            }
            let ran_dry = clip.len() < wanted;

            if let Some(phrase) = self.check_clip(&clip, rate) {
                tracing::info!(%phrase, "wake word detected in fallback mode");
                return Ok(ListenOutcome::Detected(WakeEvent::now(Some(phrase))));
            }
            if ran_dry {
                return Ok(ListenOutcome::Exhausted);
            }
        }
    }
}
