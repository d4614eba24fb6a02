//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Captures at the device's native rate. USB microphones on small boards
//! often reject 16 kHz outright, so conversion happens downstream through
//! [`crate::audio::resample`].

use crate::audio::resample;
use crate::audio::source::AudioSource;
use crate::defaults;
use crate::error::{Result, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// ALSA prints a wall of probe warnings whenever CPAL enumerates devices.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Name fragments that mark a USB microphone.
const USB_PATTERNS: &[&str] = &["usb", "fifine", "pnp", "microphone", "mic"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "hdmi", "s/pdif", "iec958"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

fn is_usb_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    USB_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// List input devices, marking the one that would be picked automatically.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices())
        .map_err(|e| VoiceError::capture(format!("Failed to enumerate input devices: {e}")))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_usb_device(&name) {
                names.push(format!("{name} [usb]"));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Find an input device by exact name, or pick a USB microphone, then the default.
fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| VoiceError::capture(format!("Failed to enumerate devices: {e}")))?
            .collect();

        if let Some(name) = device_name {
            return devices
                .into_iter()
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| VoiceError::AudioDeviceNotFound {
                    device: name.to_string(),
                });
        }

        if let Some(usb) = devices
            .into_iter()
            .find(|d| d.name().is_ok_and(|n| is_usb_device(&n) && !should_filter_device(&n)))
        {
            return Ok(usb);
        }

        host.default_input_device()
            .ok_or_else(|| VoiceError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Pick the capture rate: first probe rate the device supports, else its default.
fn probe_sample_rate(device: &cpal::Device) -> u32 {
    if let Ok(ranges) = device.supported_input_configs() {
        let ranges: Vec<_> = ranges.collect();
        for &rate in defaults::PROBE_SAMPLE_RATES {
            if !resample::is_supported_rate(rate) {
                continue;
            }
            if ranges
                .iter()
                .any(|r| r.min_sample_rate() <= SampleRate(rate) && r.max_sample_rate() >= SampleRate(rate))
            {
                return rate;
            }
        }
    }
    device
        .default_input_config()
        .map(|c| c.sample_rate().0)
        .unwrap_or(defaults::FALLBACK_MIC_RATE)
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the thread holding the
/// microphone lease, one thread at a time.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone input via CPAL, delivering mono i16 at the native rate.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Open an input device.
    ///
    /// `sample_rate` forces a capture rate; `None` probes the device.
    pub fn new(device_name: Option<&str>, sample_rate: Option<u32>) -> Result<Self> {
        let device = find_device(device_name)?;
        let sample_rate = sample_rate.unwrap_or_else(|| probe_sample_rate(&device));

        tracing::info!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            "microphone selected"
        );

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
        })
    }

    /// Channel count and sample format to open the stream with.
    fn stream_shape(&self) -> Result<(u16, SampleFormat)> {
        let ranges: Vec<_> = self
            .device
            .supported_input_configs()
            .map_err(|e| VoiceError::DeviceUnavailable {
                message: format!("Failed to query input configs: {e}"),
            })?
            .filter(|r| {
                r.min_sample_rate() <= SampleRate(self.sample_rate)
                    && r.max_sample_rate() >= SampleRate(self.sample_rate)
            })
            .collect();

        let pick = ranges
            .iter()
            .find(|r| r.channels() == 1 && r.sample_format() == SampleFormat::I16)
            .or_else(|| ranges.iter().find(|r| r.channels() == 1))
            .or_else(|| ranges.first())
            .ok_or_else(|| VoiceError::DeviceUnavailable {
                message: format!("Device does not support {} Hz capture", self.sample_rate),
            })?;

        Ok((pick.channels(), pick.sample_format()))
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let (channels, format) = self.stream_shape()?;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = usize::from(channels);

        let err_callback = |err| {
            tracing::error!(error = %err, "audio capture error");
        };

        let buffer = Arc::clone(&self.buffer);
        let stream = match format {
            SampleFormat::I16 => self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = downmix(data, channels);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&mono);
                    }
                },
                err_callback,
                None,
            ),
            SampleFormat::F32 => self.device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let mono = downmix(&converted, channels);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&mono);
                    }
                },
                err_callback,
                None,
            ),
            other => {
                return Err(VoiceError::DeviceUnavailable {
                    message: format!("Unsupported capture sample format: {other:?}"),
                });
            }
        };

        stream.map_err(|e| VoiceError::DeviceUnavailable {
            message: format!("Failed to open input stream: {e}"),
        })
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let stream = with_suppressed_stderr(|| self.build_stream())?;
        stream.play().map_err(|e| VoiceError::DeviceUnavailable {
            message: format!("Failed to start audio stream: {e}"),
        })?;
        self.stream = Some(SendableStream(stream));
        tracing::debug!(sample_rate = self.sample_rate, "audio capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream closes the device so another pass can open it
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
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
