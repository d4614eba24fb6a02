//! Serialized speech output.
//!
//! One worker thread owns the synthesizer and the speaker. Jobs are played
//! strictly in enqueue order; a priority job drops everything still queued
//! and goes to the head. Every job carries the generation of the interaction
//! that produced it, and [`SpeechQueue::interrupt`] advances the generation,
//! so stale jobs are dropped wherever they are found.

use crate::audio::Player;
use crate::error::{Result, VoiceError};
use crate::session::ControlEvent;
use crate::tts::Synthesizer;
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One line of speech.
#[derive(Debug, Clone)]
pub struct TtsJob {
    pub text: String,
    pub priority: bool,
    pub enqueued_at: Instant,
    pub generation: u64,
}

impl TtsJob {
    pub fn new(text: impl Into<String>, priority: bool, generation: u64) -> Self {
        Self {
            text: text.into(),
            priority,
            enqueued_at: Instant::now(),
            generation,
        }
    }
}

/// Worker-side flags. Guarded together so an interrupt can never be left set
/// after the job it was aimed at has finished.
#[derive(Default)]
struct WorkerFlags {
    busy: bool,
}

struct Shared {
    jobs_tx: Sender<TtsJob>,
    jobs_rx: Receiver<TtsJob>,
    /// Serializes producers against draining and interrupts.
    flags: Mutex<WorkerFlags>,
    interrupt: AtomicBool,
    generation: AtomicU64,
    outstanding: AtomicUsize,
    events: Option<Sender<ControlEvent>>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, WorkerFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove every queued job. Caller holds the flags lock.
    fn drain(&self) -> usize {
        let drained = self.jobs_rx.try_iter().count();
        if drained > 0 {
            tracing::debug!(drained, "discarded queued speech");
            self.release(drained);
        }
        drained
    }

    /// Mark `count` jobs as done, announcing when nothing is left.
    fn release(&self, count: usize) {
        let before = self.outstanding.fetch_sub(count, Ordering::SeqCst);
        if before == count {
            self.notify(ControlEvent::QueueIdle {
                generation: self.generation.load(Ordering::SeqCst),
            });
        }
    }

    fn notify(&self, event: ControlEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Handle to the speech worker.
pub struct SpeechQueue {
    shared: Arc<Shared>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    /// Start the worker. `events` receives `SpeechStarted` and `QueueIdle`.
    pub fn spawn(
        synthesizer: Box<dyn Synthesizer>,
        player: Box<dyn Player>,
        events: Option<Sender<ControlEvent>>,
    ) -> Result<Self> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared {
            jobs_tx,
            jobs_rx,
            flags: Mutex::new(WorkerFlags::default()),
            interrupt: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
            events,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("speech-worker".to_string())
            .spawn(move || run_worker(&worker_shared, synthesizer, player, &stop_rx))?;

        Ok(Self {
            shared,
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Generation new jobs are tagged with.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Queue `text` under the current generation.
    pub fn enqueue(&self, text: &str, priority: bool) -> Result<()> {
        self.enqueue_job(TtsJob::new(text, priority, self.generation()))
    }

    /// Queue a job. Jobs from an older generation are dropped.
    pub fn enqueue_job(&self, job: TtsJob) -> Result<()> {
        let text = job.text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let _flags = self.shared.lock();
        if job.generation < self.generation() {
            tracing::debug!(generation = job.generation, "dropping speech from a stale interaction");
            return Ok(());
        }
        if job.priority {
            self.shared.drain();
        }

        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(priority = job.priority, text = %preview(&job.text), "queued speech");
        self.shared.jobs_tx.send(job).map_err(|_| {
            self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            VoiceError::ChannelClosed {
                name: "speech jobs".to_string(),
            }
        })
    }

    /// Stop what is playing, drop everything queued and move to a new
    /// generation. Returns the new generation.
    pub fn interrupt(&self) -> u64 {
        let flags = self.shared.lock();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.drain();
        if flags.busy {
            self.shared.interrupt.store(true, Ordering::SeqCst);
        }
        tracing::info!(generation, busy = flags.busy, "speech interrupted");
        generation
    }

    /// Nothing queued or playing.
    pub fn is_idle(&self) -> bool {
        self.shared.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Jobs queued or playing.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    /// Block until idle or `timeout` passes. Returns whether idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Cut off playback and stop the worker.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.interrupt();
        self.stop.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("speech worker panicked");
        }
    }
}

/// Destination for spoken lines. Pairs with [`crate::dispatch::Dispatcher`]
/// the way an audio source pairs with the recorder.
pub trait SpeechSink: Send + Sync {
    /// Generation of the interaction currently allowed to speak.
    fn generation(&self) -> u64;

    fn enqueue_job(&self, job: TtsJob) -> Result<()>;
}

impl SpeechSink for SpeechQueue {
    fn generation(&self) -> u64 {
        SpeechQueue::generation(self)
    }

    fn enqueue_job(&self, job: TtsJob) -> Result<()> {
        SpeechQueue::enqueue_job(self, job)
    }
}

impl<T: SpeechSink + ?Sized> SpeechSink for Arc<T> {
    fn generation(&self) -> u64 {
        (**self).generation()
    }

    fn enqueue_job(&self, job: TtsJob) -> Result<()> {
        (**self).enqueue_job(job)
    }
}

/// Collects jobs instead of speaking them, for tests and the `ask` command.
///
/// Applies the same priority and generation rules as the real queue.
#[derive(Debug, Default)]
pub struct CollectorSpeech {
    jobs: Mutex<Vec<TtsJob>>,
    generation: AtomicU64,
}

impl CollectorSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the generation, as an interrupt would.
    pub fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Jobs still queued, in play order.
    pub fn jobs(&self) -> Vec<TtsJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.jobs().into_iter().map(|job| job.text).collect()
    }
}

impl SpeechSink for CollectorSpeech {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn enqueue_job(&self, job: TtsJob) -> Result<()> {
        if job.text.trim().is_empty() || job.generation < self.generation() {
            return Ok(());
        }
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if job.priority {
            jobs.clear();
        }
        jobs.push(job);
        Ok(())
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_worker();
        }
    }
}

fn run_worker(
    shared: &Shared,
    synthesizer: Box<dyn Synthesizer>,
    mut player: Box<dyn Player>,
    stop: &Receiver<()>,
) {
    tracing::debug!("speech worker started");
    loop {
        let job = select! {
            recv(shared.jobs_rx) -> job => match job {
                Ok(job) => job,
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        };

        shared.lock().busy = true;
        play_job(shared, synthesizer.as_ref(), player.as_mut(), &job);
        {
            let mut flags = shared.lock();
            shared.interrupt.store(false, Ordering::SeqCst);
            flags.busy = false;
        }
        shared.release(1);
    }
    tracing::debug!("speech worker stopped");
}

fn play_job(shared: &Shared, synthesizer: &dyn Synthesizer, player: &mut dyn Player, job: &TtsJob) {
    let is_stale = || job.generation < shared.generation.load(Ordering::SeqCst);

    if is_stale() {
        tracing::debug!(text = %preview(&job.text), "skipping stale speech");
        return;
    }
    if shared.interrupt.swap(false, Ordering::SeqCst) {
        tracing::info!(text = %preview(&job.text), "speech interrupted, skipping queued line");
        return;
    }

    let wav = match synthesizer.synthesize(&job.text) {
        Ok(wav) => wav,
        Err(e) => {
            tracing::error!(error = %e, "speech synthesis failed");
            return;
        }
    };

    if is_stale() || shared.interrupt.swap(false, Ordering::SeqCst) {
        tracing::info!(text = %preview(&job.text), "interrupted during synthesis");
        return;
    }

    tracing::info!(
        queued_ms = job.enqueued_at.elapsed().as_millis() as u64,
        text = %preview(&job.text),
        "speaking"
    );
    shared.notify(ControlEvent::SpeechStarted {
        generation: job.generation,
    });
    if let Err(e) = player.play(&wav, &shared.interrupt) {
        tracing::error!(error = %e, "playback failed");
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 50;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockPlayer;
    use crate::tts::RecordingSynthesizer;

    const WAIT: Duration = Duration::from_secs(5);

    fn queue(
        play_ms: u64,
    ) -> (SpeechQueue, RecordingSynthesizer, MockPlayer, Receiver<ControlEvent>) {
        let synth = RecordingSynthesizer::new();
        let player = MockPlayer::new().with_duration(Duration::from_millis(play_ms));
        let (tx, rx) = crossbeam_channel::unbounded();
        let queue =
            SpeechQueue::spawn(Box::new(synth.clone()), Box::new(player.clone()), Some(tx)).unwrap();
        (queue, synth, player, rx)
    }

    fn played_texts(player: &MockPlayer) -> Vec<String> {
        player
            .played()
            .into_iter()
            .map(|wav| String::from_utf8(wav).unwrap())
            .collect()
    }

    #[test]
    fn test_jobs_play_in_fifo_order() {
        let (queue, _, player, _) = queue(5);
        for text in ["one.", "two.", "three."] {
            queue.enqueue(text, false).unwrap();
        }
        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["one.", "two.", "three."]);
    }

    #[test]
    fn test_priority_discards_backlog() {
        let (queue, _, player, _) = queue(100);
        queue.enqueue("first.", false).unwrap();
        // Let the worker pick up the first job
        thread::sleep(Duration::from_millis(30));
        queue.enqueue("second.", false).unwrap();
        queue.enqueue("third.", false).unwrap();
        queue.enqueue("urgent.", true).unwrap();

        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["first.", "urgent."]);
    }

    #[test]
    fn test_interrupt_stops_playback_and_drains() {
        let (queue, synth, player, _) = queue(2000);
        queue.enqueue("a long answer.", false).unwrap();
        queue.enqueue("more answer.", false).unwrap();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        queue.interrupt();
        assert!(queue.wait_idle(WAIT));
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(synth.texts(), vec!["a long answer."]);
        // Cut off before completion
        assert!(player.played().is_empty());
    }

    #[test]
    fn test_interrupt_flag_does_not_leak_to_next_interaction() {
        let (queue, _, player, _) = queue(200);
        queue.enqueue("old.", false).unwrap();
        thread::sleep(Duration::from_millis(30));
        queue.interrupt();
        assert!(queue.wait_idle(WAIT));

        queue.enqueue("new answer.", false).unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["new answer."]);
    }

    #[test]
    fn test_idle_interrupt_sets_no_flag() {
        let (queue, _, player, _) = queue(5);
        queue.interrupt();
        queue.enqueue("after.", false).unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["after."]);
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let (queue, _, player, _) = queue(5);
        let old = queue.generation();
        queue.interrupt();
        queue.enqueue_job(TtsJob::new("from before.", false, old)).unwrap();
        queue.enqueue("current.", false).unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["current."]);
    }

    #[test]
    fn test_events_report_start_and_idle() {
        let (queue, _, _, events) = queue(5);
        queue.enqueue("hello.", false).unwrap();
        assert!(queue.wait_idle(WAIT));

        let first = events.recv_timeout(WAIT).unwrap();
        assert!(matches!(first, ControlEvent::SpeechStarted { generation: 0 }));
        let second = events.recv_timeout(WAIT).unwrap();
        assert!(matches!(second, ControlEvent::QueueIdle { .. }));
    }

    #[test]
    fn test_synthesis_failure_skips_line() {
        let synth = RecordingSynthesizer::new().failing_on("bad");
        let player = MockPlayer::new();
        let queue = SpeechQueue::spawn(Box::new(synth), Box::new(player.clone()), None).unwrap();

        queue.enqueue("bad line.", false).unwrap();
        queue.enqueue("good line.", false).unwrap();
        assert!(queue.wait_idle(WAIT));
        assert_eq!(played_texts(&player), vec!["good line."]);
    }

    #[test]
    fn test_blank_text_is_ignored() {
        let (queue, _, _, _) = queue(5);
        queue.enqueue("   ", false).unwrap();
        assert!(queue.is_idle());
    }

    #[test]
    fn test_shutdown_cuts_playback() {
        let (queue, _, _, _) = queue(5000);
        queue.enqueue("never ending.", false).unwrap();
        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        queue.shutdown();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_collector_follows_queue_rules() {
        let collector = CollectorSpeech::new();
        collector.enqueue_job(TtsJob::new("one.", false, 0)).unwrap();
        collector.enqueue_job(TtsJob::new("two.", false, 0)).unwrap();
        collector.enqueue_job(TtsJob::new("urgent.", true, 0)).unwrap();
        assert_eq!(collector.texts(), vec!["urgent."]);

        collector.advance_generation();
        collector.enqueue_job(TtsJob::new("stale.", false, 0)).unwrap();
        assert_eq!(collector.texts(), vec!["urgent."]);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(60)).len(), 53);
    }
}
