//! Command capture after a wake event.
//!
//! Reads native-rate frames from the microphone, keeps everything from speech
//! onset until the silence cutoff or the hard cap, and hands back the
//! utterance resampled for transcription.

use crate::audio::{
    AudioFrame, AudioSource, FrameRead, FrameReader, MicOwner, SharedMicrophone, Vad, VadConfig,
    VadDecision, resample,
};
use crate::config::RecorderConfig;
use crate::error::{Result, VoiceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Frames from speech onset to cutoff, in capture order.
#[derive(Debug, Clone)]
pub struct CommandUtterance {
    frames: Vec<AudioFrame>,
    started_at: Instant,
    ended_at: Instant,
    capped: bool,
}

impl CommandUtterance {
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Native-rate samples of the whole utterance.
    pub fn samples(&self) -> Vec<i16> {
        let total = self.frames.iter().map(AudioFrame::len).sum();
        let mut samples = Vec::with_capacity(total);
        for frame in &self.frames {
            samples.extend_from_slice(frame.samples());
        }
        samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.frames.first().map_or(0, AudioFrame::sample_rate)
    }

    pub fn duration(&self) -> Duration {
        self.frames.iter().map(AudioFrame::duration).sum()
    }

    /// When recording began, before speech onset.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn ended_at(&self) -> Instant {
        self.ended_at
    }

    /// True when the hard cap, not silence, ended the recording.
    pub fn capped(&self) -> bool {
        self.capped
    }

    /// The utterance converted to `rate` for the transcriber.
    pub fn resampled(&self, rate: u32) -> Vec<i16> {
        resample(&self.samples(), self.sample_rate(), rate)
    }
}

/// Captures one command per call. Threshold and durations are fixed at
/// construction and never change during a capture.
pub struct CommandRecorder {
    config: RecorderConfig,
    read_timeout: Duration,
}

impl CommandRecorder {
    pub fn new(config: RecorderConfig, read_timeout: Duration) -> Self {
        Self {
            config,
            read_timeout,
        }
    }

    fn vad_config(&self) -> VadConfig {
        VadConfig {
            speech_threshold: self.config.silence_threshold,
            silence_duration_ms: self.config.min_silence_ms,
            max_duration_ms: self.config.max_recording_ms,
        }
    }

    /// Acquire the microphone and capture a command.
    ///
    /// The microphone is released on return, including on error.
    pub fn record(&self, mic: &SharedMicrophone, cancel: &AtomicBool) -> Result<CommandUtterance> {
        let mut lease = mic.acquire(MicOwner::Recorder)?;
        self.record_from(lease.source(), cancel)
    }

    /// Capture from an already-started source.
    ///
    /// Returns [`VoiceError::NoSpeech`] when no onset happened before the cap
    /// or the source ran dry.
    pub fn record_from(
        &self,
        source: &mut dyn AudioSource,
        cancel: &AtomicBool,
    ) -> Result<CommandUtterance> {
        let sample_rate = source.sample_rate();
        let mut vad = Vad::new(self.vad_config(), sample_rate);
        let mut reader = FrameReader::new(self.config.chunk_size, self.read_timeout);
        let mut frames = Vec::new();
        let started_at = Instant::now();
        // Wall-clock backstop for sources that stop delivering entirely
        let deadline = started_at
            + Duration::from_millis(u64::from(self.config.max_recording_ms))
            + self.read_timeout;

        let capped = loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::debug!("recording cancelled");
                return Err(VoiceError::NoSpeech);
            }

            let frame = match reader.read_frame(source)? {
                FrameRead::Frame(frame) => frame,
                FrameRead::TimedOut if Instant::now() < deadline => continue,
                FrameRead::TimedOut => {
                    tracing::warn!("microphone stopped delivering audio during command capture");
                    break true;
                }
                FrameRead::Exhausted => break false,
            };

            let budget = vad.remaining_samples();
            let frame = if frame.len() > budget {
                let mut samples = frame.samples().to_vec();
                samples.truncate(budget);
                AudioFrame::new(samples, frame.sample_rate(), frame.sequence())
            } else {
                frame
            };

            match vad.process(frame.samples()) {
                VadDecision::Discard => {}
                VadDecision::Keep => frames.push(frame),
                VadDecision::End => {
                    frames.push(frame);
                    break false;
                }
                VadDecision::Cap => {
                    if vad.speech_started() {
                        frames.push(frame);
                    }
                    break true;
                }
            }
        };

        if frames.is_empty() {
            tracing::info!("no speech before recording cap");
            return Err(VoiceError::NoSpeech);
        }

        let utterance = CommandUtterance {
            frames,
            started_at,
            ended_at: Instant::now(),
            capped,
        };
        tracing::debug!(
            duration_ms = utterance.duration().as_millis() as u64,
            capped,
            "command captured"
        );
        Ok(utterance)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSource;
    use std::sync::Arc;

    const RATE: u32 = 48000;

    fn recorder() -> CommandRecorder {
        CommandRecorder::new(
            RecorderConfig {
                chunk_size: 1024,
                ..RecorderConfig::default()
            },
            Duration::from_millis(50),
        )
    }

    fn ms(millis: u32) -> usize {
        (RATE as usize * millis as usize) / 1000
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_silence_cutoff_within_one_frame() {
        let mut audio = vec![0i16; ms(500)];
        audio.extend(vec![4000i16; ms(1500)]);
        audio.extend(vec![0i16; ms(3000)]);
        let mut source = MockAudioSource::new(RATE).with_audio(&audio, 700);

        let utterance = recorder().record_from(&mut source, &no_cancel()).unwrap();
        assert!(!utterance.capped());

        let kept = utterance.samples().len();
        let speech = ms(1500);
        let silence = kept - speech;
        // Silence retained is at least the minimum and at most one frame more,
        // plus up to one frame of onset alignment
        assert!(silence + 1024 >= ms(800), "silence kept {silence}");
        assert!(silence <= ms(800) + 2 * 1024, "silence kept {silence}");
    }

    #[test]
    fn test_leading_silence_is_discarded() {
        let mut audio = vec![0i16; ms(2000)];
        audio.extend(vec![4000i16; ms(1000)]);
        audio.extend(vec![0i16; ms(1000)]);
        let mut source = MockAudioSource::new(RATE).with_audio(&audio, 1024);

        let utterance = recorder().record_from(&mut source, &no_cancel()).unwrap();
        assert!(utterance.samples().len() < ms(2000));
        assert!(utterance.samples().iter().take(1024).any(|&s| s != 0));
    }

    #[test]
    fn test_continuous_speech_is_capped_at_max_duration() {
        let mut source = MockAudioSource::new(RATE).then_repeat(vec![4000i16; 1024]);

        let utterance = recorder().record_from(&mut source, &no_cancel()).unwrap();
        assert!(utterance.capped());
        assert!(utterance.samples().len() <= ms(10_000));
        assert!(utterance.duration() <= Duration::from_millis(10_000));
    }

    #[test]
    fn test_cap_counts_leading_silence() {
        let mut audio = vec![0i16; ms(9500)];
        audio.extend(vec![4000i16; ms(5000)]);
        let mut source = MockAudioSource::new(RATE).with_audio(&audio, 1024);

        let utterance = recorder().record_from(&mut source, &no_cancel()).unwrap();
        assert!(utterance.capped());
        assert!(utterance.samples().len() <= ms(500) + 1024);
    }

    #[test]
    fn test_no_onset_before_cap_is_no_speech() {
        let mut source = MockAudioSource::new(RATE).then_repeat(vec![10i16; 1024]);

        match recorder().record_from(&mut source, &no_cancel()) {
            Err(VoiceError::NoSpeech) => {}
            other => panic!("Expected NoSpeech, got {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_source_without_speech_is_no_speech() {
        let mut source = MockAudioSource::new(RATE).with_audio(&vec![0i16; ms(300)], 1024);
        assert!(matches!(
            recorder().record_from(&mut source, &no_cancel()),
            Err(VoiceError::NoSpeech)
        ));
    }

    #[test]
    fn test_resampled_for_transcription() {
        let mut audio = vec![4000i16; ms(1200)];
        audio.extend(vec![0i16; ms(1000)]);
        let mut source = MockAudioSource::new(RATE).with_audio(&audio, 1024);

        let recorder = recorder();
        let samples = recorder
            .record_from(&mut source, &no_cancel())
            .unwrap()
            .resampled(recorder.config().target_sample_rate);
        // Roughly a third of the native sample count
        assert!(samples.len() > 16000 * 2 - 1000);
        assert!(samples.len() < 16000 * 2 + 1000);
    }

    #[test]
    fn test_record_releases_microphone() {
        let mut audio = vec![4000i16; ms(500)];
        audio.extend(vec![0i16; ms(1000)]);
        let mic = SharedMicrophone::new(Box::new(MockAudioSource::new(RATE).with_audio(&audio, 1024)));
        let cancel = Arc::new(AtomicBool::new(false));

        let utterance = recorder().record(&mic, &cancel).unwrap();
        assert_eq!(utterance.sample_rate(), RATE);
        assert_eq!(mic.current_owner(), None);

        // Error path releases too
        assert!(recorder().record(&mic, &cancel).is_err());
        assert_eq!(mic.current_owner(), None);
    }

    #[test]
    fn test_frames_are_time_ordered() {
        let mut audio = vec![4000i16; ms(1000)];
        audio.extend(vec![0i16; ms(1000)]);
        let mut source = MockAudioSource::new(RATE).with_audio(&audio, 333);

        let utterance = recorder().record_from(&mut source, &no_cancel()).unwrap();
        let sequences: Vec<u64> = utterance.frames().iter().map(AudioFrame::sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }
}
