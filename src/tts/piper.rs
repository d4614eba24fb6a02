//! Local synthesis with the Piper command-line tool.

use crate::audio::encode_wav;
use crate::config::TtsConfig;
use crate::error::{Result, VoiceError};
use crate::tts::Synthesizer;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Rate Piper voices use when the model config does not say.
const DEFAULT_VOICE_RATE: u32 = 22050;

#[derive(Deserialize)]
struct VoiceConfig {
    audio: VoiceAudio,
}

#[derive(Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

/// Runs `piper` once per sentence, reading raw PCM from its stdout.
pub struct PiperSynthesizer {
    model: PathBuf,
    sample_rate: u32,
    length_scale: f32,
    noise_scale: f32,
    sentence_silence: f32,
}

impl PiperSynthesizer {
    pub fn new(config: &TtsConfig) -> Self {
        let model = PathBuf::from(&config.voice);
        let sample_rate = voice_sample_rate(&model);
        Self {
            model,
            sample_rate,
            length_scale: config.length_scale,
            noise_scale: config.noise_scale,
            sentence_silence: config.sentence_silence,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn args(&self) -> Vec<String> {
        vec![
            "--model".to_string(),
            self.model.display().to_string(),
            "--output_raw".to_string(),
            "--length_scale".to_string(),
            self.length_scale.to_string(),
            "--noise_scale".to_string(),
            self.noise_scale.to_string(),
            "--sentence_silence".to_string(),
            self.sentence_silence.to_string(),
        ]
    }
}

/// Read the output rate from the `<voice>.onnx.json` file next to the model.
fn voice_sample_rate(model: &Path) -> u32 {
    let mut config_path = model.as_os_str().to_owned();
    config_path.push(".json");

    let rate = std::fs::read_to_string(&config_path)
        .ok()
        .and_then(|text| serde_json::from_str::<VoiceConfig>(&text).ok())
        .map(|voice| voice.audio.sample_rate);
    match rate {
        Some(rate) if rate > 0 => rate,
        _ => {
            tracing::debug!(
                path = %PathBuf::from(config_path).display(),
                "voice config unreadable, assuming {DEFAULT_VOICE_RATE} Hz"
            );
            DEFAULT_VOICE_RATE
        }
    }
}

impl Synthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if !self.model.exists() {
            return Err(VoiceError::synthesis(format!(
                "voice model not found: {}",
                self.model.display()
            )));
        }

        let mut child = Command::new("piper")
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VoiceError::synthesis(format!("Failed to start piper: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| VoiceError::synthesis(format!("Failed to write to piper: {e}")))?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, stderr = %stderr.trim(), "piper failed");
            return Err(VoiceError::synthesis(format!(
                "piper exited with {}",
                output.status
            )));
        }

        let samples: Vec<i16> = output
            .stdout
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if samples.is_empty() {
            return Err(VoiceError::synthesis("piper produced no audio"));
        }
        tracing::debug!(samples = samples.len(), chars = text.len(), "piper synthesis complete");
        encode_wav(&samples, self.sample_rate)
    }
}
