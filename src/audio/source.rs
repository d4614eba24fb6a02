use crate::defaults;
use crate::error::{Result, VoiceError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Trait for microphone-like audio sources.
///
/// Sources deliver mono 16-bit PCM at their native rate. Implementations
/// return whatever has accumulated since the last read, which may be empty.
pub trait AudioSource: Send {
    /// Open the device and begin capturing.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Read samples captured since the previous call.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Native sample rate of the delivered samples.
    fn sample_rate(&self) -> u32;

    /// True for sources that run dry (files, scripted test audio).
    fn is_finite(&self) -> bool {
        false
    }
}

/// Placeholder for a microphone that could not be opened at startup.
///
/// Every `start` fails, so the wake listener's retry and fallback policy
/// decides what happens next.
#[derive(Debug, Clone)]
pub struct MissingSource {
    sample_rate: u32,
    reason: String,
}

impl MissingSource {
    pub fn new(sample_rate: u32, reason: impl Into<String>) -> Self {
        Self {
            sample_rate,
            reason: reason.into(),
        }
    }
}

impl AudioSource for MissingSource {
    fn start(&mut self) -> Result<()> {
        Err(VoiceError::DeviceUnavailable {
            message: self.reason.clone(),
        })
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        Ok(Vec::new())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Scripted audio source for tests.
///
/// Plays queued chunks in order, then repeats the tail chunk forever if one
/// is set, otherwise reports exhaustion with empty reads.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    sample_rate: u32,
    chunks: VecDeque<Vec<i16>>,
    tail: Option<Vec<i16>>,
    started: Arc<AtomicBool>,
    start_failures: Arc<AtomicU32>,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create an empty mock at the given native rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunks: VecDeque::new(),
            tail: None,
            started: Arc::new(AtomicBool::new(false)),
            start_failures: Arc::new(AtomicU32::new(0)),
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Queue chunks returned one per read.
    pub fn with_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.chunks.extend(chunks);
        self
    }

    /// Split `samples` into reads of `chunk` samples and queue them.
    pub fn with_audio(mut self, samples: &[i16], chunk: usize) -> Self {
        self.chunks
            .extend(samples.chunks(chunk.max(1)).map(|c| c.to_vec()));
        self
    }

    /// Returned forever once the queued chunks run out.
    pub fn then_repeat(mut self, chunk: Vec<i16>) -> Self {
        self.tail = Some(chunk);
        self
    }

    /// Fail the next `count` calls to `start`.
    pub fn with_start_failures(self, count: u32) -> Self {
        self.start_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Shared flag reflecting whether the source is currently started.
    ///
    /// Stays valid after the mock is boxed and moved elsewhere.
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.started)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new(defaults::SAMPLE_RATE)
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        let remaining = self.start_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.start_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VoiceError::DeviceUnavailable {
                message: self.error_message.clone(),
            });
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(VoiceError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(chunk);
        }
        Ok(self.tail.clone().unwrap_or_default())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finite(&self) -> bool {
        self.tail.is_none()
    }
}
