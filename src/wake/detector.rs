//! Frame plumbing between the microphone and a trigger classifier.

use crate::audio::{AudioFrame, AudioSource, FrameRead, FrameReader, resample};
use crate::defaults;
use crate::error::Result;
use crate::wake::{TriggerClassifier, WakeEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How one listening pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    Detected(WakeEvent),
    Cancelled,
    /// The source ran dry (file input, scripted audio).
    Exhausted,
}

/// Resamples native frames to the classifier rate and feeds it exact
/// classifier-length chunks.
pub struct WakeWordDetector {
    classifier: Box<dyn TriggerClassifier>,
    pending: Vec<i16>,
    read_timeout: Duration,
}

impl WakeWordDetector {
    pub fn new(classifier: Box<dyn TriggerClassifier>) -> Self {
        Self {
            classifier,
            pending: Vec::new(),
            read_timeout: Duration::from_millis(defaults::READ_TIMEOUT_MS),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Samples to read per frame at `native_rate` so one frame resamples to
    /// about one classifier frame.
    pub fn native_frame_len(&self, native_rate: u32) -> usize {
        let target = u64::from(self.classifier.sample_rate().max(1));
        let len = self.classifier.frame_length() as u64;
        let native = ((len * u64::from(native_rate) + target / 2) / target) as usize;
        native.max(1)
    }

    /// Feed one microphone frame.
    ///
    /// On detection the classifier and the pending buffer are reset so the
    /// next call starts clean.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> Result<Option<WakeEvent>> {
        let target_rate = self.classifier.sample_rate();
        let frame_length = self.classifier.frame_length();
        self.pending
            .extend(resample(frame.samples(), frame.sample_rate(), target_rate));

        let mut consumed = 0;
        let mut detected = false;
        while self.pending.len() - consumed >= frame_length {
            let chunk = &self.pending[consumed..consumed + frame_length];
            consumed += frame_length;
            if self.classifier.process(chunk)? {
                detected = true;
                break;
            }
        }

        if detected {
            tracing::info!(sequence = frame.sequence(), "wake word detected");
            self.reset();
            return Ok(Some(WakeEvent::now(None)));
        }
        self.pending.drain(..consumed);
        Ok(None)
    }

    /// Drop buffered audio and classifier state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.classifier.reset();
    }

    /// Read from an already-started source until the phrase is heard, the
    /// source runs dry, or `cancel` is raised.
    pub fn listen(&mut self, source: &mut dyn AudioSource, cancel: &AtomicBool) -> Result<ListenOutcome> {
        self.reset();
        let mut reader = FrameReader::new(self.native_frame_len(source.sample_rate()), self.read_timeout);

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(ListenOutcome::Cancelled);
            }
            match reader.read_frame(source)? {
                FrameRead::Frame(frame) => {
                    if let Some(event) = self.process_frame(&frame)? {
                        return Ok(ListenOutcome::Detected(event));
                    }
                }
                FrameRead::TimedOut => {
                    tracing::trace!("no audio within read timeout");
                }
                FrameRead::Exhausted => return Ok(ListenOutcome::Exhausted),
            }
        }
    }
}
