//! Speaker output.
//!
//! Only the speech worker owns a [`Player`]; nothing else writes to the
//! speaker.

use crate::defaults;
use crate::error::{Result, VoiceError};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval while waiting for playback to finish.
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// Blocking audio output.
pub trait Player: Send {
    /// Play a WAV clip, returning once it has finished or `cancel` was raised.
    ///
    /// A cancelled clip is not an error.
    fn play(&mut self, wav: &[u8], cancel: &AtomicBool) -> Result<()>;
}

/// Plays through ALSA's `aplay` on a fixed device.
pub struct AplayPlayer {
    program: PathBuf,
    device: String,
}

impl AplayPlayer {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from(defaults::APLAY_PROGRAM),
            device: device.into(),
        }
    }

    /// Run a different `aplay` binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Player for AplayPlayer {
    fn play(&mut self, wav: &[u8], cancel: &AtomicBool) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(["-q", "-D", &self.device, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                VoiceError::playback(format!("Failed to start {}: {e}", self.program.display()))
            })?;

        // Clips larger than the pipe buffer block the writer until aplay
        // has consumed them, so the poll loop below must not wait on it
        let writer = match child.stdin.take() {
            Some(mut pipe) => {
                let clip = wav.to_vec();
                let spawned = thread::Builder::new()
                    .name("aplay-writer".to_string())
                    .spawn(move || pipe.write_all(&clip));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::debug!("playback cancelled");
                let _ = child.kill();
                let _ = child.wait();
                // The writer fails with a broken pipe once aplay is gone
                drop(writer);
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    if let Some(Ok(Err(e))) = writer.map(JoinHandle::join) {
                        tracing::debug!(error = %e, "aplay exited before reading the whole clip");
                    }
                    return Ok(());
                }
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return Err(VoiceError::playback(format!(
                    "aplay on {} exited with {status}: {}",
                    self.device,
                    stderr.trim()
                )));
            }
            thread::sleep(PLAYBACK_POLL);
        }
    }
}

/// Plays through the default CPAL output device.
#[cfg(feature = "cpal-audio")]
pub struct CpalPlayer;

#[cfg(feature = "cpal-audio")]
impl Player for CpalPlayer {
    fn play(&mut self, wav: &[u8], cancel: &AtomicBool) -> Result<()> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let decoded = crate::audio::wav::decode_wav(std::io::Cursor::new(wav))?;
        if decoded.samples.is_empty() {
            return Ok(());
        }

        let device = crate::audio::capture::with_suppressed_stderr(|| {
            cpal::default_host().default_output_device()
        })
        .ok_or_else(|| VoiceError::DeviceUnavailable {
            message: "no output device available".to_string(),
        })?;

        let rate = cpal::SampleRate(decoded.sample_rate);
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| VoiceError::playback(e.to_string()))?
            .collect();
        let range = pick_output_config(&ranges, rate).ok_or_else(|| {
            VoiceError::playback(format!("no usable output config at {} Hz", decoded.sample_rate))
        })?;
        let format = range.sample_format();
        let config = range.with_sample_rate(rate).config();

        let samples: Arc<Vec<f32>> = Arc::new(
            decoded
                .samples
                .iter()
                .map(|&s| f32::from(s) / 32768.0)
                .collect(),
        );
        let finished = Arc::new(AtomicBool::new(false));

        let stream = match format {
            cpal::SampleFormat::F32 => {
                output_stream::<f32>(&device, &config, Arc::clone(&samples), Arc::clone(&finished))
            }
            cpal::SampleFormat::I16 => {
                output_stream::<i16>(&device, &config, Arc::clone(&samples), Arc::clone(&finished))
            }
            cpal::SampleFormat::U16 => {
                output_stream::<u16>(&device, &config, Arc::clone(&samples), Arc::clone(&finished))
            }
            other => Err(VoiceError::playback(format!("unsupported output format {other}"))),
        }?;

        stream
            .play()
            .map_err(|e| VoiceError::playback(e.to_string()))?;

        let duration_ms = samples.len() as u64 * 1000 / u64::from(decoded.sample_rate);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = std::time::Instant::now();

        while !finished.load(Ordering::SeqCst) && !cancel.load(Ordering::SeqCst) {
            if start.elapsed() > timeout {
                break;
            }
            thread::sleep(PLAYBACK_POLL);
        }

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");
        Ok(())
    }
}

/// Output formats the player can feed, most preferred first.
#[cfg(feature = "cpal-audio")]
const OUTPUT_FORMATS: &[cpal::SampleFormat] = &[
    cpal::SampleFormat::F32,
    cpal::SampleFormat::I16,
    cpal::SampleFormat::U16,
];

/// Fewest-channel config that covers `rate` in the most preferred format.
#[cfg(feature = "cpal-audio")]
fn pick_output_config(
    ranges: &[cpal::SupportedStreamConfigRange],
    rate: cpal::SampleRate,
) -> Option<cpal::SupportedStreamConfigRange> {
    OUTPUT_FORMATS.iter().find_map(|&format| {
        ranges
            .iter()
            .filter(|c| c.sample_format() == format)
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .min_by_key(|c| c.channels())
            .cloned()
    })
}

/// Mono `samples` duplicated across channels, converted to the device format.
#[cfg(feature = "cpal-audio")]
fn output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Vec<f32>>,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    use cpal::Sample;
    use cpal::traits::DeviceTrait;

    let channels = usize::from(config.channels);
    let mut position = 0usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or(0.0);
                    if position < samples.len() {
                        position += 1;
                    } else {
                        finished.store(true, Ordering::SeqCst);
                    }
                    frame.fill(T::from_sample(sample));
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| VoiceError::playback(e.to_string()))
}

/// Records what would have been played. For tests and dry runs.
#[derive(Clone, Default)]
pub struct MockPlayer {
    played: Arc<Mutex<Vec<Vec<u8>>>>,
    duration: Duration,
    fail: bool,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for `duration` per clip, as real playback would.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Clips played so far, shared with every clone.
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Player for MockPlayer {
    fn play(&mut self, wav: &[u8], cancel: &AtomicBool) -> Result<()> {
        if self.fail {
            return Err(VoiceError::playback("mock playback failure"));
        }
        let start = std::time::Instant::now();
        while start.elapsed() < self.duration {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
        if let Ok(mut played) = self.played.lock() {
            played.push(wav.to_vec());
        }
        Ok(())
    }
}
