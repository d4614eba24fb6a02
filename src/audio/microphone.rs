//! Exclusive microphone ownership.
//!
//! The wake listener, the command recorder and the interrupt monitor all read
//! from the same device. Each pass acquires a [`MicLease`]; the source is
//! started on acquisition and stopped when the lease drops, on every exit path.

use crate::audio::source::AudioSource;
use crate::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which component currently holds the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicOwner {
    WakeWord,
    Recorder,
    Interrupt,
}

impl fmt::Display for MicOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MicOwner::WakeWord => "wake-word",
            MicOwner::Recorder => "recorder",
            MicOwner::Interrupt => "interrupt",
        };
        f.write_str(name)
    }
}

/// Cloneable handle to the one microphone in the process.
#[derive(Clone)]
pub struct SharedMicrophone {
    source: Arc<Mutex<Box<dyn AudioSource>>>,
    owner: Arc<Mutex<Option<MicOwner>>>,
    sample_rate: Arc<AtomicU32>,
}

impl SharedMicrophone {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        let sample_rate = source.sample_rate();
        Self {
            source: Arc::new(Mutex::new(source)),
            owner: Arc::new(Mutex::new(None)),
            sample_rate: Arc::new(AtomicU32::new(sample_rate)),
        }
    }

    /// Native rate of the wrapped source.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }

    /// Swap the underlying device, waiting for the current holder to finish.
    pub fn replace_source(&self, source: Box<dyn AudioSource>) {
        let mut guard = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        self.sample_rate.store(source.sample_rate(), Ordering::SeqCst);
        *guard = source;
        tracing::info!(sample_rate = self.sample_rate(), "microphone source replaced");
    }

    /// Block until the microphone is free, then start it for `owner`.
    ///
    /// If the device fails to start the microphone is released again and the
    /// error is returned.
    pub fn acquire(&self, owner: MicOwner) -> Result<MicLease<'_>> {
        let guard = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        self.start_lease(guard, owner)
    }

    /// The current holder, if any.
    pub fn current_owner(&self) -> Option<MicOwner> {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_lease<'a>(
        &'a self,
        mut guard: MutexGuard<'a, Box<dyn AudioSource>>,
        owner: MicOwner,
    ) -> Result<MicLease<'a>> {
        guard.start()?;
        self.set_owner(Some(owner));
        tracing::trace!(%owner, "microphone acquired");
        Ok(MicLease {
            source: guard,
            owner,
            mic: self,
        })
    }

    fn set_owner(&self, owner: Option<MicOwner>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = owner;
    }
}

/// Scoped microphone access. Stops the source when dropped.
pub struct MicLease<'a> {
    source: MutexGuard<'a, Box<dyn AudioSource>>,
    owner: MicOwner,
    mic: &'a SharedMicrophone,
}

impl MicLease<'_> {
    pub fn owner(&self) -> MicOwner {
        self.owner
    }

    pub fn source(&mut self) -> &mut dyn AudioSource {
        self.source.as_mut()
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

impl Drop for MicLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.source.stop() {
            tracing::warn!(owner = %self.owner, "failed to stop microphone: {e}");
        }
        self.mic.set_owner(None);
        tracing::trace!(owner = %self.owner, "microphone released");
    }
}
