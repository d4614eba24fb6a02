//! Background thread that owns wake and interrupt listening.
//!
//! The orchestrator asks for one pass at a time. Each pass takes the
//! microphone, listens until the phrase is heard or the pass is cancelled,
//! releases the microphone and only then reports back, so the recorder can
//! take the device as soon as it sees the event.
//!
//! Device open failures are retried with doubling backoff. After
//! `max_open_failures` in a row the listener swaps in the fallback source and
//! switches to clip-based detection; if that is unavailable too, voice input
//! is disabled.

use crate::audio::{ArecordSource, AudioSource, MicOwner, SharedMicrophone, arecord_available};
use crate::config::WakeConfig;
use crate::error::{Result, VoiceError};
use crate::interrupt::InterruptMonitor;
use crate::session::ControlEvent;
use crate::wake::detector::ListenOutcome;
use crate::wake::{FallbackListener, WakeWordDetector};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cancellation poll interval while backing off.
const BACKOFF_POLL: Duration = Duration::from_millis(50);

/// Kind of listening pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenRequest {
    /// Listen for the trigger phrase while idle.
    Wake,
    /// Listen for barge-in while speaking.
    Interrupt,
}

enum Message {
    Listen(ListenRequest, Arc<AtomicBool>),
    Stop,
}

/// Builds the source swapped in after repeated open failures.
pub type FallbackSourceFactory = Box<dyn FnMut() -> Result<Box<dyn AudioSource>> + Send>;

/// Retry and fallback policy.
pub struct ListenerConfig {
    pub max_open_failures: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub fallback_source: FallbackSourceFactory,
}

impl ListenerConfig {
    /// Policy from config, falling back to `arecord` on `clip_device`.
    pub fn from_wake(config: &WakeConfig) -> Self {
        let device = config.clip_device.clone();
        let rate = config.sample_rate;
        Self {
            max_open_failures: config.max_open_failures.max(1),
            retry_base: Duration::from_millis(config.retry_base_ms),
            retry_max: Duration::from_millis(config.retry_max_ms),
            fallback_source: Box::new(move || {
                if !arecord_available() {
                    return Err(VoiceError::DeviceUnavailable {
                        message: "arecord is not installed".to_string(),
                    });
                }
                Ok(Box::new(ArecordSource::new(device.clone(), rate)) as Box<dyn AudioSource>)
            }),
        }
    }
}

/// Control side of the listener thread.
pub struct ListenerHandle {
    requests: Sender<Message>,
    active: Mutex<Option<Arc<AtomicBool>>>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Start a pass, cancelling any pass still running or queued.
    pub fn request(&self, kind: ListenRequest) -> Result<()> {
        let token = Arc::new(AtomicBool::new(false));
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = active.replace(Arc::clone(&token)) {
                previous.store(true, Ordering::SeqCst);
            }
        }
        self.requests
            .send(Message::Listen(kind, token))
            .map_err(|_| VoiceError::ChannelClosed {
                name: "listener requests".to_string(),
            })
    }

    /// Cancel the current pass, if any. The microphone is released once the
    /// pass notices, within one read timeout.
    pub fn cancel(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = active.take() {
            token.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel, stop the thread and wait for it.
    pub fn shutdown(mut self) {
        self.cancel();
        let _ = self.requests.send(Message::Stop);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("wake listener thread panicked");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel();
        let _ = self.requests.send(Message::Stop);
    }
}

/// What a wake pass ended with.
#[derive(Debug)]
enum PassResult {
    Outcome(ListenOutcome),
    Disabled(String),
}

struct Listener {
    mic: SharedMicrophone,
    detector: WakeWordDetector,
    fallback: FallbackListener,
    interrupt: InterruptMonitor,
    config: ListenerConfig,
    events: Sender<ControlEvent>,
    failures: u32,
    backoff: Duration,
    in_fallback: bool,
    disabled: Option<String>,
}

/// Spawn the listener thread.
pub fn spawn_listener(
    mic: SharedMicrophone,
    detector: WakeWordDetector,
    fallback: FallbackListener,
    interrupt: InterruptMonitor,
    config: ListenerConfig,
    events: Sender<ControlEvent>,
) -> Result<ListenerHandle> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let backoff = config.retry_base;
    let mut listener = Listener {
        mic,
        detector,
        fallback,
        interrupt,
        config,
        events,
        failures: 0,
        backoff,
        in_fallback: false,
        disabled: None,
    };

    let thread = thread::Builder::new()
        .name("wake-listener".to_string())
        .spawn(move || listener.run(rx))?;

    Ok(ListenerHandle {
        requests: tx,
        active: Mutex::new(None),
        thread: Some(thread),
    })
}

impl Listener {
    fn run(&mut self, requests: Receiver<Message>) {
        while let Ok(message) = requests.recv() {
            let (kind, cancel) = match message {
                Message::Listen(kind, cancel) => (kind, cancel),
                Message::Stop => break,
            };
            if cancel.load(Ordering::SeqCst) {
                continue;
            }

            let event = match kind {
                ListenRequest::Wake => self.wake_pass(&cancel),
                ListenRequest::Interrupt => self.interrupt_pass(&cancel),
            };
            if let Some(event) = event
                && self.events.send(event).is_err()
            {
                break;
            }
        }
        tracing::debug!("wake listener stopped");
    }

    fn wake_pass(&mut self, cancel: &AtomicBool) -> Option<ControlEvent> {
        match self.listen_for_wake(cancel) {
            PassResult::Outcome(ListenOutcome::Detected(event)) => Some(ControlEvent::WakeDetected(event)),
            PassResult::Outcome(ListenOutcome::Cancelled) => None,
            PassResult::Outcome(ListenOutcome::Exhausted) => Some(ControlEvent::InputEnded),
            PassResult::Disabled(reason) => Some(ControlEvent::VoiceDisabled { reason }),
        }
    }

    fn interrupt_pass(&mut self, cancel: &AtomicBool) -> Option<ControlEvent> {
        if self.disabled.is_some() {
            return None;
        }
        match self.interrupt.monitor(&self.mic, cancel) {
            Ok(event) => event.map(ControlEvent::InterruptDetected),
            Err(e) => {
                tracing::debug!(error = %e, "interrupt monitor could not listen");
                None
            }
        }
    }

    fn listen_for_wake(&mut self, cancel: &AtomicBool) -> PassResult {
        loop {
            if let Some(reason) = &self.disabled {
                return PassResult::Disabled(reason.clone());
            }
            if cancel.load(Ordering::SeqCst) {
                return PassResult::Outcome(ListenOutcome::Cancelled);
            }

            let result = self.listen_once(cancel);
            match result {
                Ok(outcome) => {
                    self.failures = 0;
                    self.backoff = self.config.retry_base;
                    return PassResult::Outcome(outcome);
                }
                Err(e) => {
                    self.failures += 1;
                    tracing::warn!(
                        error = %e,
                        failures = self.failures,
                        fallback = self.in_fallback,
                        "wake listening failed"
                    );
                    if self.failures >= self.config.max_open_failures {
                        self.escalate(&e);
                        continue;
                    }
                    if !sleep_unless_cancelled(self.backoff, cancel) {
                        return PassResult::Outcome(ListenOutcome::Cancelled);
                    }
                    self.backoff = (self.backoff * 2).min(self.config.retry_max);
                }
            }
        }
    }

    fn listen_once(&mut self, cancel: &AtomicBool) -> Result<ListenOutcome> {
        let mut lease = self.mic.acquire(MicOwner::WakeWord)?;
        if self.in_fallback {
            self.fallback.listen(lease.source(), cancel)
        } else {
            self.detector.listen(lease.source(), cancel)
        }
    }

    /// Too many failures: move to the fallback source, or give up.
    fn escalate(&mut self, last_error: &VoiceError) {
        self.failures = 0;
        self.backoff = self.config.retry_base;

        if self.in_fallback {
            self.disable(format!("fallback microphone keeps failing: {last_error}"));
            return;
        }
        match (self.config.fallback_source)() {
            Ok(source) => {
                tracing::warn!("switching wake detection to fallback clip mode");
                self.mic.replace_source(source);
                self.in_fallback = true;
            }
            Err(e) => self.disable(format!("no usable microphone ({last_error}); fallback unavailable: {e}")),
        }
    }

    fn disable(&mut self, reason: String) {
        tracing::error!(%reason, "voice input disabled");
        self.disabled = Some(reason);
    }
}

/// Sleep for `duration`, waking early if `cancel` is raised. Returns false
/// when cancelled.
fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(BACKOFF_POLL.min(deadline - now));
    }
}
