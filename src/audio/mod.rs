//! Audio I/O: microphone sources, exclusive microphone access, resampling,
//! WAV helpers, energy-based voice activity detection and playback.

pub mod arecord;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod microphone;
pub mod playback;
pub mod resample;
pub mod source;
pub mod vad;
pub mod wav;

pub use arecord::{ArecordSource, arecord_available};
pub use frame::{AudioFrame, FrameRead, FrameReader};
pub use microphone::{MicLease, MicOwner, SharedMicrophone};
pub use playback::{AplayPlayer, MockPlayer, Player};
pub use resample::resample;
pub use source::{AudioSource, MissingSource, MockAudioSource};
pub use vad::{Vad, VadConfig, VadDecision, calculate_rms};
pub use wav::{WavAudioSource, decode_wav, encode_wav};
