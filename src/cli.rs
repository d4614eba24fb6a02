//! Command-line interface for voiceclock
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Voice control for a verse clock
#[derive(Parser, Debug)]
#[command(name = "voiceclock", version, about = "Voice control for a verse clock")]
pub struct Cli {
    /// Subcommand to execute (default: run the assistant)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device name
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Listen for the trigger phrase while speaking
    #[arg(long)]
    pub interrupt: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Speak a line through the configured voice
    Say {
        /// Text to speak
        text: String,
    },

    /// Handle typed text as if it had been spoken after the trigger phrase
    Ask {
        /// Command or question
        text: String,
    },

    /// Run the assistant on a recorded WAV file instead of the microphone
    Replay {
        /// WAV file containing the trigger phrase and a command
        path: PathBuf,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
