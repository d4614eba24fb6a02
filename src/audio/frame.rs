//! Fixed-length audio frames read from a source with a bounded wait.

use crate::audio::source::AudioSource;
use crate::error::Result;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while a live source has nothing buffered.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fixed-size block of mono PCM samples. Immutable once captured.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    sequence: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Position in the stream this frame was read from; strictly increasing.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the frame at its sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Outcome of one bounded frame read.
#[derive(Debug)]
pub enum FrameRead {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout; the caller decides whether to retry.
    TimedOut,
    /// A finite source ran dry.
    Exhausted,
}

/// Re-slices arbitrary source reads into frames of exactly `frame_len` samples.
pub struct FrameReader {
    frame_len: usize,
    timeout: Duration,
    pending: Vec<i16>,
    sequence: u64,
}

impl FrameReader {
    pub fn new(frame_len: usize, timeout: Duration) -> Self {
        Self {
            frame_len: frame_len.max(1),
            timeout,
            pending: Vec::with_capacity(frame_len * 2),
            sequence: 0,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Read the next full frame, waiting at most the configured timeout.
    pub fn read_frame(&mut self, source: &mut dyn AudioSource) -> Result<FrameRead> {
        let deadline = Instant::now() + self.timeout;

        while self.pending.len() < self.frame_len {
            let samples = source.read_samples()?;
            if samples.is_empty() {
                if source.is_finite() {
                    return Ok(FrameRead::Exhausted);
                }
                if Instant::now() >= deadline {
                    return Ok(FrameRead::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            self.pending.extend_from_slice(&samples);
        }

        let rest = self.pending.split_off(self.frame_len);
        let samples = std::mem::replace(&mut self.pending, rest);
        let frame = AudioFrame::new(samples, source.sample_rate(), self.sequence);
        self.sequence += 1;
        Ok(FrameRead::Frame(frame))
    }

}
