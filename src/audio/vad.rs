//! Voice Activity Detection (VAD) module.
//!
//! Energy-threshold speech detection with a silence cutoff and a hard cap.
//! Durations are measured in samples fed, not wall-clock time, so a frame
//! boundary is the finest granularity and results do not depend on how fast
//! frames arrive.

use crate::defaults;

/// Configuration for Voice Activity Detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub speech_threshold: f32,
    /// Contiguous silence after onset that ends the utterance (milliseconds).
    pub silence_duration_ms: u32,
    /// Total audio fed before the detector gives up (milliseconds).
    pub max_duration_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: defaults::SILENCE_THRESHOLD,
            silence_duration_ms: defaults::MIN_SILENCE_MS,
            max_duration_ms: defaults::MAX_RECORDING_MS,
        }
    }
}

/// Current state of voice activity detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Waiting for speech onset.
    Armed,
    /// Speech has started; retaining frames.
    Speaking,
    /// Silence cutoff or cap reached.
    Finished,
}

/// What to do with the frame just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Pre-onset frame, not part of the utterance.
    Discard,
    /// Part of the utterance; keep reading.
    Keep,
    /// Part of the utterance, and the silence cutoff was reached with it.
    End,
    /// Maximum duration reached. The frame belongs to the utterance only if
    /// speech had started.
    Cap,
}

/// Voice Activity Detector state machine.
#[derive(Debug, Clone)]
pub struct Vad {
    config: VadConfig,
    state: VadState,
    silence_limit: u64,
    max_samples: u64,
    total_samples: u64,
    silence_run: u64,
    speech_samples: u64,
}

impl Vad {
    /// Create a detector for audio arriving at `sample_rate`.
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        let to_samples = |ms: u32| u64::from(sample_rate) * u64::from(ms) / 1000;
        Self {
            config,
            state: VadState::Armed,
            silence_limit: to_samples(config.silence_duration_ms).max(1),
            max_samples: to_samples(config.max_duration_ms).max(1),
            total_samples: 0,
            silence_run: 0,
            speech_samples: 0,
        }
    }

    /// Process one frame and decide what happens to it.
    ///
    /// Callers that must not exceed the cap should first trim the frame to
    /// [`Vad::remaining_samples`].
    pub fn process(&mut self, samples: &[i16]) -> VadDecision {
        if self.state == VadState::Finished {
            return VadDecision::Cap;
        }

        let is_speech = calculate_rms(samples) > self.config.speech_threshold;
        let len = samples.len() as u64;
        self.total_samples += len;

        let decision = match self.state {
            VadState::Armed if is_speech => {
                self.state = VadState::Speaking;
                self.speech_samples += len;
                tracing::trace!(at = self.total_samples, "speech onset");
                VadDecision::Keep
            }
            VadState::Armed => VadDecision::Discard,
            VadState::Speaking if is_speech => {
                self.silence_run = 0;
                self.speech_samples += len;
                VadDecision::Keep
            }
            VadState::Speaking => {
                self.silence_run += len;
                if self.silence_run >= self.silence_limit {
                    VadDecision::End
                } else {
                    VadDecision::Keep
                }
            }
            VadState::Finished => VadDecision::Cap,
        };

        if decision == VadDecision::End {
            self.state = VadState::Finished;
            return decision;
        }
        if self.total_samples >= self.max_samples {
            self.state = VadState::Finished;
            return VadDecision::Cap;
        }
        decision
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    /// Whether speech onset has been observed.
    pub fn speech_started(&self) -> bool {
        self.speech_samples > 0
    }

    /// Samples above threshold seen so far.
    pub fn speech_samples(&self) -> u64 {
        self.speech_samples
    }

    /// Samples that can still be fed before the cap.
    pub fn remaining_samples(&self) -> usize {
        self.max_samples.saturating_sub(self.total_samples) as usize
    }

    /// Return to the armed state with all counters cleared.
    pub fn reset(&mut self) {
        self.state = VadState::Armed;
        self.total_samples = 0;
        self.silence_run = 0;
        self.speech_samples = 0;
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// # Returns
/// Normalized RMS value (0.0 to 1.0), where:
/// - 0.0 represents silence
/// - ~0.707 represents a full-scale sine wave
/// - 1.0 represents maximum amplitude
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;
    // 100ms frames
    const FRAME: usize = 1600;

    fn silence() -> Vec<i16> {
        vec![0i16; FRAME]
    }

    fn speech() -> Vec<i16> {
        vec![3000i16; FRAME]
    }

    fn vad(silence_ms: u32, max_ms: u32) -> Vad {
        Vad::new(
            VadConfig {
                speech_threshold: 0.02,
                silence_duration_ms: silence_ms,
                max_duration_ms: max_ms,
            },
            RATE,
        )
    }

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&silence()), 0.0);
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_max_amplitude() {
        let rms = calculate_rms(&vec![i16::MAX; 1000]);
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn test_rms_mixed_positive_negative() {
        let mut mixed = vec![1000i16; 500];
        mixed.extend(vec![-1000i16; 500]);
        let rms = calculate_rms(&mixed);
        // 1000/32767 ≈ 0.0305
        assert!(rms > 0.025 && rms < 0.035, "RMS should be ~0.0305, got {}", rms);
    }

    #[test]
    fn test_default_threshold_matches_quiet_room() {
        // i16 RMS of 500 sits just above the default threshold
        assert!(calculate_rms(&vec![500i16; 100]) > VadConfig::default().speech_threshold);
        assert!(calculate_rms(&vec![400i16; 100]) < VadConfig::default().speech_threshold);
    }

    #[test]
    fn test_discards_until_onset() {
        let mut vad = vad(800, 10_000);
        assert_eq!(vad.process(&silence()), VadDecision::Discard);
        assert_eq!(vad.state(), VadState::Armed);
        assert!(!vad.speech_started());

        assert_eq!(vad.process(&speech()), VadDecision::Keep);
        assert_eq!(vad.state(), VadState::Speaking);
        assert!(vad.speech_started());
    }

    #[test]
    fn test_short_pause_does_not_end_utterance() {
        let mut vad = vad(300, 10_000);
        vad.process(&speech());
        assert_eq!(vad.process(&silence()), VadDecision::Keep);
        assert_eq!(vad.process(&silence()), VadDecision::Keep);
        // Speech resumes and resets the silence run
        assert_eq!(vad.process(&speech()), VadDecision::Keep);
        assert_eq!(vad.process(&silence()), VadDecision::Keep);
        assert_eq!(vad.process(&silence()), VadDecision::Keep);
        assert_eq!(vad.process(&silence()), VadDecision::End);
    }

    #[test]
    fn test_ends_on_the_frame_reaching_min_silence() {
        let mut vad = vad(800, 10_000);
        vad.process(&speech());
        for _ in 0..7 {
            assert_eq!(vad.process(&silence()), VadDecision::Keep);
        }
        assert_eq!(vad.process(&silence()), VadDecision::End);
        assert_eq!(vad.state(), VadState::Finished);
    }

    #[test]
    fn test_cap_without_speech() {
        let mut vad = vad(800, 500);
        for _ in 0..4 {
            assert_eq!(vad.process(&silence()), VadDecision::Discard);
        }
        assert_eq!(vad.process(&silence()), VadDecision::Cap);
        assert!(!vad.speech_started());
    }

    #[test]
    fn test_cap_with_continuous_speech() {
        let mut vad = vad(800, 1000);
        for _ in 0..9 {
            assert_eq!(vad.process(&speech()), VadDecision::Keep);
        }
        assert_eq!(vad.remaining_samples(), FRAME);
        assert_eq!(vad.process(&speech()), VadDecision::Cap);
        assert_eq!(vad.remaining_samples(), 0);
        assert_eq!(vad.process(&speech()), VadDecision::Cap);
    }

    #[test]
    fn test_reset_rearms() {
        let mut vad = vad(100, 10_000);
        vad.process(&speech());
        vad.process(&silence());
        assert_eq!(vad.state(), VadState::Finished);

        vad.reset();
        assert_eq!(vad.state(), VadState::Armed);
        assert_eq!(vad.speech_samples(), 0);
        assert_eq!(vad.process(&speech()), VadDecision::Keep);
    }
}
