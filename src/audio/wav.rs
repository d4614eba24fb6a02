//! WAV encoding for upload, decoding for playback, and a file-backed source.

use crate::audio::source::AudioSource;
use crate::error::{Result, VoiceError};
use std::io::{Cursor, Read};
use std::path::Path;

/// Decoded PCM audio, downmixed to mono.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Encode mono 16-bit PCM into an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| VoiceError::capture(format!("Failed to create WAV writer: {e}")))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| VoiceError::capture(format!("Failed to write WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoiceError::capture(format!("Failed to finalize WAV: {e}")))?;
    Ok(cursor.into_inner())
}

/// Decode WAV data into mono 16-bit samples at the file's own rate.
///
/// Float and wider integer formats are converted; multi-channel audio is
/// averaged down to one channel.
pub fn decode_wav(reader: impl Read) -> Result<DecodedAudio> {
    let mut wav_reader = hound::WavReader::new(reader)
        .map_err(|e| VoiceError::capture(format!("Failed to parse WAV file: {e}")))?;
    let spec = wav_reader.spec();

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<std::result::Result<_, _>>(),
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
            wav_reader.samples::<i16>().collect::<std::result::Result<_, _>>()
        }
        hound::SampleFormat::Int => {
            let shift = u32::from(spec.bits_per_sample.saturating_sub(16));
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<_, _>>()
        }
    }
    .map_err(|e| VoiceError::capture(format!("Failed to read WAV samples: {e}")))?;

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Finite audio source that replays a WAV file at its native rate.
///
/// Used to run a recorded command through the pipeline without a microphone.
pub struct WavAudioSource {
    samples: Vec<i16>,
    sample_rate: u32,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let decoded = decode_wav(reader)?;
        // 100ms reads at the file's rate
        let chunk_size = (decoded.sample_rate as usize / 10).max(1);
        Ok(Self {
            samples: decoded.samples,
            sample_rate: decoded.sample_rate,
            position: 0,
            chunk_size,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Append trailing silence so the silence cutoff can close the command.
    pub fn with_trailing_silence(mut self, millis: u32) -> Self {
        let count = (self.sample_rate as u64 * u64::from(millis) / 1000) as usize;
        self.samples.extend(std::iter::repeat_n(0i16, count));
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }
        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finite(&self) -> bool {
        true
    }
}
