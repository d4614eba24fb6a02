//! Barge-in while an answer is being spoken.
//!
//! A second wake-word detector that runs only while the speech queue is
//! busy. It takes the microphone like any other owner, so it never listens
//! at the same time as the main wake listener or the recorder. On a hit the
//! orchestrator interrupts the speech queue, starts a fresh interaction
//! and records straight away.

use crate::audio::{MicOwner, SharedMicrophone};
use crate::error::Result;
use crate::wake::detector::ListenOutcome;
use crate::wake::{WakeEvent, WakeWordDetector};
use std::sync::atomic::AtomicBool;

pub struct InterruptMonitor {
    detector: WakeWordDetector,
    enabled: bool,
}

impl InterruptMonitor {
    pub fn new(detector: WakeWordDetector, enabled: bool) -> Self {
        Self { detector, enabled }
    }

    /// Listen for the trigger phrase until it is heard or `cancel` is raised.
    ///
    /// Returns `None` when disabled, cancelled, or the input ran dry. Fails
    /// when the microphone cannot be opened during playback, which is common
    /// on half-duplex USB audio.
    pub fn monitor(&mut self, mic: &SharedMicrophone, cancel: &AtomicBool) -> Result<Option<WakeEvent>> {
        if !self.enabled {
            return Ok(None);
        }

        let mut lease = mic.acquire(MicOwner::Interrupt)?;
        tracing::debug!("interrupt monitor listening");
        match self.detector.listen(lease.source(), cancel)? {
            ListenOutcome::Detected(event) => {
                tracing::info!("interrupt phrase detected during playback");
                Ok(Some(event))
            }
            ListenOutcome::Cancelled | ListenOutcome::Exhausted => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSource;
    use crate::wake::MockClassifier;

    fn monitor(enabled: bool, fire_on: &[usize]) -> InterruptMonitor {
        let classifier = MockClassifier::new(16000, 512).firing_on(fire_on);
        InterruptMonitor::new(WakeWordDetector::new(Box::new(classifier)), enabled)
    }

    #[test]
    fn test_disabled_monitor_never_takes_microphone() {
        let source = MockAudioSource::new(16000).then_repeat(vec![0; 512]);
        let started = source.started_flag();
        let mic = SharedMicrophone::new(Box::new(source));

        let mut interrupt = monitor(false, &[1]);
        assert_eq!(interrupt.monitor(&mic, &AtomicBool::new(false)).unwrap(), None);
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_detection_releases_microphone() {
        let mic = SharedMicrophone::new(Box::new(
            MockAudioSource::new(16000).then_repeat(vec![0; 512]),
        ));

        let mut interrupt = monitor(true, &[3]);
        let event = interrupt.monitor(&mic, &AtomicBool::new(false)).unwrap();
        assert!(event.is_some());
        assert_eq!(mic.current_owner(), None);
    }

    #[test]
    fn test_busy_device_is_an_error() {
        let mic = SharedMicrophone::new(Box::new(MockAudioSource::new(16000).with_start_failures(1)));
        let mut interrupt = monitor(true, &[1]);
        assert!(interrupt.monitor(&mic, &AtomicBool::new(false)).is_err());
    }

    #[test]
    fn test_cancel_returns_none() {
        let mic = SharedMicrophone::new(Box::new(
            MockAudioSource::new(16000).then_repeat(vec![0; 512]),
        ));
        let mut interrupt = monitor(true, &[]);
        assert_eq!(interrupt.monitor(&mic, &AtomicBool::new(true)).unwrap(), None);
    }
}
