//! Speech-to-text collaborators.

pub mod openai;
pub mod transcriber;

pub use openai::OpenAiTranscriber;
pub use transcriber::{MockTranscriber, Transcriber, normalize_transcript};
