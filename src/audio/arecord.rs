//! Microphone input through ALSA's `arecord`.
//!
//! Used when the native capture path keeps failing to open the device: the
//! ALSA plug layer resamples in the driver, so this source always delivers
//! the rate it was asked for.

use crate::audio::source::AudioSource;
use crate::error::{Result, VoiceError};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Bytes read from `arecord` per pipe read (~32ms at 16 kHz).
const PIPE_CHUNK_BYTES: usize = 1024;

/// Whether an `arecord` binary can be run.
pub fn arecord_available() -> bool {
    Command::new("arecord")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Raw S16_LE mono capture from a subprocess.
pub struct ArecordSource {
    device: String,
    sample_rate: u32,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    buffer: Arc<Mutex<Vec<i16>>>,
}

impl ArecordSource {
    pub fn new(device: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            device: device.into(),
            sample_rate,
            child: None,
            reader: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AudioSource for ArecordSource {
    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let rate = self.sample_rate.to_string();
        let mut child = Command::new("arecord")
            .args(["-q", "-D", &self.device, "-f", "S16_LE", "-c", "1", "-r", &rate, "-t", "raw"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VoiceError::DeviceUnavailable {
                message: format!("Failed to start arecord: {e}"),
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| VoiceError::DeviceUnavailable {
            message: "arecord stdout unavailable".to_string(),
        })?;
        let buffer = Arc::clone(&self.buffer);

        let reader = thread::Builder::new()
            .name("arecord-reader".to_string())
            .spawn(move || {
                let mut bytes = [0u8; PIPE_CHUNK_BYTES];
                let mut carry: Option<u8> = None;
                loop {
                    let n = match stdout.read(&mut bytes) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let mut samples = Vec::with_capacity(n / 2 + 1);
                    let mut iter = bytes[..n].iter().copied();
                    if let Some(low) = carry.take()
                        && let Some(high) = iter.next()
                    {
                        samples.push(i16::from_le_bytes([low, high]));
                    }
                    let rest: Vec<u8> = iter.collect();
                    let mut pairs = rest.chunks_exact(2);
                    samples.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
                    carry = pairs.remainder().first().copied();

                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&samples);
                    }
                }
            })
            .map_err(|e| VoiceError::DeviceUnavailable {
                message: format!("Failed to spawn arecord reader: {e}"),
            })?;

        self.child = Some(child);
        self.reader = Some(reader);
        tracing::debug!(device = %self.device, rate = self.sample_rate, "arecord capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            tracing::warn!("arecord reader thread panicked");
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if let Some(child) = self.child.as_mut()
            && let Some(status) = child.try_wait()?
            && !status.success()
        {
            return Err(VoiceError::DeviceUnavailable {
                message: format!("arecord on {} exited with {status}", self.device),
            });
        }
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|e| VoiceError::capture(format!("Failed to lock audio buffer: {e}")))?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for ArecordSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reports_requested_rate() {
        let source = ArecordSource::new("plughw:1,0", 16000);
        assert_eq!(source.sample_rate(), 16000);
        assert!(!source.is_finite());
    }

    #[test]
    fn test_stop_without_start_is_ok() {
        let mut source = ArecordSource::new("default", 16000);
        assert!(source.stop().is_ok());
    }

    #[test]
    #[ignore] // Requires arecord and a capture device
    fn test_captures_audio() {
        let mut source = ArecordSource::new("default", 16000);
        source.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let samples = source.read_samples().unwrap();
        source.stop().unwrap();
        assert!(!samples.is_empty());
    }
}
