//! The control loop.
//!
//! Owns the interaction state and is the only place it changes. Everything
//! else talks to it through [`ControlEvent`]s: the wake listener reports
//! trigger phrases, the speech worker reports playback, and answer threads
//! report streamed progress. Recording and transcription run on the loop
//! itself, so there is never more than one recorder.

use crate::audio::SharedMicrophone;
use crate::defaults;
use crate::dispatch::{DispatchOutcome, Dispatcher, Route, VisualFeedback};
use crate::error::{ErrorClass, Result, VoiceError};
use crate::metrics::MetricsSummary;
use crate::recorder::CommandRecorder;
use crate::session::{ControlEvent, InteractionSession, SessionEvent, VoiceState, transition};
use crate::speech_queue::SpeechQueue;
use crate::stt::Transcriber;
use crate::wake::{ListenRequest, ListenerHandle, WakeEvent};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How long a finite input run waits for queued speech before exiting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The single channel into the control loop.
pub struct ControlChannel {
    tx: Sender<ControlEvent>,
    rx: Receiver<ControlEvent>,
}

impl ControlChannel {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<ControlEvent> {
        self.tx.clone()
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Stops a running [`Orchestrator`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    events: Sender<ControlEvent>,
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.events.send(ControlEvent::Shutdown);
    }
}

/// Collaborators the loop drives directly.
pub struct Components {
    pub mic: SharedMicrophone,
    pub recorder: CommandRecorder,
    pub transcriber: Arc<dyn Transcriber>,
    pub dispatcher: Dispatcher,
    pub feedback: Arc<dyn VisualFeedback>,
    pub interrupt_enabled: bool,
}

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    /// A finite input source ran dry.
    InputEnded,
    /// Every sender went away.
    Disconnected,
}

pub struct Orchestrator {
    mic: SharedMicrophone,
    recorder: CommandRecorder,
    transcriber: Arc<dyn Transcriber>,
    dispatcher: Arc<Dispatcher>,
    feedback: Arc<dyn VisualFeedback>,
    interrupt_enabled: bool,
    speech: Arc<SpeechQueue>,
    listener: ListenerHandle,
    events_tx: Sender<ControlEvent>,
    events: Receiver<ControlEvent>,
    shutdown: Arc<AtomicBool>,
    state: VoiceState,
    session: Option<InteractionSession>,
    dispatch_pending: bool,
    listening: bool,
    summary: MetricsSummary,
}

impl Orchestrator {
    /// `speech` and `listener` must have been started with senders from
    /// `channel`.
    pub fn new(
        components: Components,
        speech: SpeechQueue,
        listener: ListenerHandle,
        channel: ControlChannel,
    ) -> Self {
        Self {
            mic: components.mic,
            recorder: components.recorder,
            transcriber: components.transcriber,
            dispatcher: Arc::new(components.dispatcher),
            feedback: components.feedback,
            interrupt_enabled: components.interrupt_enabled,
            speech: Arc::new(speech),
            listener,
            events_tx: channel.tx,
            events: channel.rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: VoiceState::Idle,
            session: None,
            dispatch_pending: false,
            listening: false,
            summary: MetricsSummary::default(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            events: self.events_tx.clone(),
            flag: Arc::clone(&self.shutdown),
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Run until shutdown or until a finite input runs dry.
    pub fn run(mut self) -> Result<MetricsSummary> {
        self.feedback.update_state("ready", "Voice control ready");
        self.listen_if_idle();

        let reason = loop {
            let Ok(event) = self.events.recv() else {
                break StopReason::Disconnected;
            };
            match event {
                ControlEvent::Shutdown => break StopReason::Shutdown,
                ControlEvent::InputEnded => break StopReason::InputEnded,
                event => {
                    if let Err(e) = self.handle(event) {
                        tracing::error!(error = %e, state = %self.state, "control loop error");
                        self.recover();
                    }
                }
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
        };

        tracing::info!(?reason, "voice control stopping");
        Ok(self.stop(reason))
    }

    fn handle(&mut self, event: ControlEvent) -> Result<()> {
        match event {
            ControlEvent::WakeDetected(wake) => self.on_wake(wake),
            ControlEvent::InterruptDetected(wake) => self.on_interrupt(wake),
            ControlEvent::VoiceDisabled { reason } => {
                self.listening = false;
                self.apply(SessionEvent::Disable, &reason)
            }
            ControlEvent::SpeechStarted { generation } => self.on_speech_started(generation),
            ControlEvent::QueueIdle { .. } => {
                self.maybe_finish()?;
                self.listen_if_idle();
                Ok(())
            }
            ControlEvent::FirstToken { generation } => {
                if let Some(session) = self.current(generation) {
                    session.metrics.mark_first_token(Instant::now());
                }
                Ok(())
            }
            ControlEvent::DispatchDone {
                generation,
                outcome,
            } => {
                if let Some(session) = self.current(generation) {
                    session.outcome = Some(outcome);
                    self.dispatch_pending = false;
                }
                self.maybe_finish()
            }
            ControlEvent::InputEnded | ControlEvent::Shutdown => Ok(()),
        }
    }

    fn on_wake(&mut self, wake: WakeEvent) -> Result<()> {
        self.listening = false;
        if self.state != VoiceState::Idle {
            tracing::debug!(state = %self.state, "ignoring wake outside idle");
            return Ok(());
        }
        tracing::info!(phrase = ?wake.phrase, "wake phrase detected");
        self.session = Some(InteractionSession::new(self.speech.generation(), Some(wake)));
        self.apply(SessionEvent::Wake, "Wake word detected")?;
        self.apply(SessionEvent::RecordingStarted, "Listening for your command")?;
        self.capture_and_dispatch()
    }

    fn on_interrupt(&mut self, wake: WakeEvent) -> Result<()> {
        if self.state != VoiceState::Speaking {
            tracing::debug!(state = %self.state, "ignoring late interrupt");
            return Ok(());
        }
        let generation = self.speech.interrupt();
        self.feedback.update_state("interrupted", "Stopped speaking");
        self.dispatch_pending = false;
        // Timing restarts at the barge-in
        self.session = Some(InteractionSession::new(generation, Some(wake)));
        self.apply(SessionEvent::Interrupt, "Listening for your command")?;
        self.capture_and_dispatch()
    }

    fn on_speech_started(&mut self, generation: u64) -> Result<()> {
        let Some(session) = self.current(generation) else {
            return Ok(());
        };
        session.metrics.mark_first_speech(Instant::now());

        let was_speaking = self.state == VoiceState::Speaking;
        if matches!(
            self.state,
            VoiceState::LocalResponse | VoiceState::StreamingAnswer | VoiceState::Speaking
        ) {
            self.apply(SessionEvent::SpeechStarted, "Speaking")?;
        }
        if !was_speaking && self.state == VoiceState::Speaking && self.interrupt_enabled {
            self.listener.request(ListenRequest::Interrupt)?;
        }
        Ok(())
    }

    /// Recording through dispatch, on the loop thread. Recoverable failures
    /// are spoken and end the interaction.
    fn capture_and_dispatch(&mut self) -> Result<()> {
        let started = Instant::now();
        if let Some(session) = self.session.as_mut() {
            session.metrics.mark_command_start(started);
        }

        let audio = match self.recorder.record(&self.mic, &self.shutdown) {
            Ok(utterance) => {
                if let Some(session) = self.session.as_mut() {
                    session.metrics.mark_command_end(utterance.ended_at());
                }
                utterance.resampled(self.recorder.config().target_sample_rate)
            }
            Err(VoiceError::Io(e)) => {
                return self.fail(VoiceError::capture(format!("microphone read failed: {e}")));
            }
            Err(e) => return self.fail(e),
        };
        self.apply(SessionEvent::CommandCaptured, "Processing your command")?;

        let transcript = match self.transcriber.transcribe(&audio) {
            Ok(text) => text,
            Err(e) => return self.fail(e),
        };
        tracing::info!(transcript = %transcript, "command transcribed");
        if let Some(session) = self.session.as_mut() {
            session.transcript = Some(transcript.clone());
        }
        self.apply(SessionEvent::Transcribed, &transcript)?;

        let generation = self.generation();
        if let Some(session) = self.session.as_mut() {
            session.metrics.mark_answer_start(Instant::now());
        }
        match self.dispatcher.route(&transcript) {
            Route::Builtin(command) => {
                self.apply(SessionEvent::MatchedBuiltin, "Running command")?;
                let outcome = self
                    .dispatcher
                    .run_builtin(command, self.speech.as_ref(), generation)?;
                if let Some(session) = self.session.as_mut() {
                    session.outcome = Some(outcome);
                }
                self.maybe_finish()
            }
            Route::Question(question) => {
                self.apply(SessionEvent::AskedQuestion, "Thinking")?;
                self.dispatch_pending = true;
                self.spawn_answer(question, generation)
            }
        }
    }

    fn spawn_answer(&mut self, question: String, generation: u64) -> Result<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let speech = Arc::clone(&self.speech);
        let events = self.events_tx.clone();

        let spawned = thread::Builder::new()
            .name("answer-stream".to_string())
            .spawn(move || {
                let mut on_first_token = || {
                    let _ = events.send(ControlEvent::FirstToken { generation });
                };
                let outcome = dispatcher.answer(&question, speech.as_ref(), generation, &mut on_first_token);
                let _ = events.send(ControlEvent::DispatchDone {
                    generation,
                    outcome,
                });
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "could not start answer thread");
            self.dispatch_pending = false;
            self.speech.enqueue(defaults::ANSWER_APOLOGY, false)?;
            if let Some(session) = self.session.as_mut() {
                session.outcome = Some(DispatchOutcome::AnswerFailed);
            }
        }
        Ok(())
    }

    /// Speak the recovery line for `error` and return to idle.
    fn fail(&mut self, error: VoiceError) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        let prompt = match error.class() {
            ErrorClass::Capture | ErrorClass::Device => Some(defaults::NO_SPEECH_PROMPT),
            ErrorClass::Recognition => Some(defaults::RECOGNITION_APOLOGY),
            ErrorClass::Answer => Some(defaults::ANSWER_APOLOGY),
            ErrorClass::Internal => None,
        };
        tracing::warn!(error = %error, class = ?error.class(), "interaction failed");

        if let Some(prompt) = prompt {
            self.speech.enqueue(prompt, false)?;
        }
        self.session = None;
        self.dispatch_pending = false;
        self.apply(SessionEvent::Failed, &error.to_string())?;
        self.listen_if_idle();
        Ok(())
    }

    /// End the interaction once the answer is complete and fully spoken.
    fn maybe_finish(&mut self) -> Result<()> {
        let responding = matches!(
            self.state,
            VoiceState::LocalResponse | VoiceState::StreamingAnswer | VoiceState::Speaking
        );
        if !responding || self.dispatch_pending || !self.speech.is_idle() {
            return Ok(());
        }

        if let Some(session) = self.session.take() {
            let timing = session.metrics.timing(Instant::now());
            timing.log();
            self.summary.record(timing);
            tracing::debug!(outcome = ?session.outcome, "interaction finished");
        }
        self.apply(SessionEvent::Finished, "Listening for the wake word")?;
        self.listen_if_idle();
        Ok(())
    }

    /// Start a wake pass once idle with nothing left to say.
    fn listen_if_idle(&mut self) {
        if self.state != VoiceState::Idle || self.listening || !self.speech.is_idle() {
            return;
        }
        match self.listener.request(ListenRequest::Wake) {
            Ok(()) => self.listening = true,
            Err(e) => tracing::error!(error = %e, "wake listener unavailable"),
        }
    }

    fn apply(&mut self, event: SessionEvent, message: &str) -> Result<()> {
        let next = transition(self.state, event)?;
        tracing::debug!(from = %self.state, to = %next, %event, "state change");
        self.state = next;
        self.feedback.update_state(next.name(), message);
        Ok(())
    }

    /// Back to idle after an internal error.
    fn recover(&mut self) {
        if self.state == VoiceState::Disabled {
            return;
        }
        // Anything still streaming belongs to the abandoned interaction
        self.speech.interrupt();
        self.session = None;
        self.dispatch_pending = false;
        self.listening = false;
        self.state = VoiceState::Idle;
        self.feedback.update_state(self.state.name(), "Recovered from an error");
        self.listen_if_idle();
    }

    fn generation(&self) -> u64 {
        self.session
            .as_ref()
            .map_or_else(|| self.speech.generation(), |s| s.generation)
    }

    /// The session for `generation`, if it is still the current one.
    fn current(&mut self, generation: u64) -> Option<&mut InteractionSession> {
        self.session.as_mut().filter(|s| s.generation == generation)
    }

    fn stop(self, reason: StopReason) -> MetricsSummary {
        self.listener.cancel();
        if reason == StopReason::InputEnded && !self.speech.wait_idle(DRAIN_TIMEOUT) {
            tracing::warn!("speech still queued at exit");
        }
        self.listener.shutdown();
        match Arc::try_unwrap(self.speech) {
            Ok(speech) => speech.shutdown(),
            Err(speech) => {
                speech.interrupt();
            }
        }
        self.summary.log_summary();
        self.feedback.update_state("shutdown", "Voice control stopped");
        self.summary
    }
}
