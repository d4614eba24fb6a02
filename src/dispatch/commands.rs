//! Built-in voice commands.

use crate::defaults;
use chrono::{DateTime, TimeZone};
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Explain,
    Next,
    Previous,
    CurrentItem,
    Time,
    Status,
}

/// Checked in order; the first phrase contained in the text wins.
const COMMAND_TABLE: &[(Command, &[&str])] = &[
    (Command::Help, &["help", "commands", "what can you do"]),
    (
        Command::Explain,
        &["explain this verse", "explain verse", "what does this mean", "explain this"],
    ),
    (Command::Next, &["next verse", "next"]),
    (Command::Previous, &["previous verse", "previous"]),
    (
        Command::CurrentItem,
        &["current verse", "read verse", "this verse", "speak verse"],
    ),
    (Command::Time, &["what time is it", "current time"]),
    (Command::Status, &["system status", "status"]),
];

/// Case-insensitive substring match against the command table.
pub fn match_command(text: &str) -> Option<Command> {
    let lowered = text.to_lowercase();
    COMMAND_TABLE
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| lowered.contains(phrase)))
        .map(|(command, _)| *command)
}

/// Spoken form of the local time, e.g. "It is 07:05 PM on Sunday, October 18".
pub fn spoken_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("It is %I:%M %p on %A, %B %d").to_string()
}

/// CPU and memory load, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemLoad {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl SystemLoad {
    /// Sample the host. `None` when memory totals are unavailable.
    pub fn sample() -> Option<Self> {
        let mut system = System::new();
        system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        Some(Self {
            cpu_percent: system.global_cpu_usage(),
            memory_percent: (system.used_memory() as f64 / total as f64 * 100.0) as f32,
        })
    }

    pub fn describe(&self) -> String {
        let rating = if self.cpu_percent < 50.0 && self.memory_percent < 70.0 {
            "excellent"
        } else if self.cpu_percent < 70.0 && self.memory_percent < 80.0 {
            "good"
        } else {
            "moderate"
        };
        format!(
            "System status is {rating}. CPU usage is {:.0} percent. Memory usage is {:.0} percent.",
            self.cpu_percent, self.memory_percent
        )
    }
}

/// Status line for the `status` command.
pub fn spoken_status() -> String {
    match SystemLoad::sample() {
        Some(load) => load.describe(),
        None => {
            tracing::warn!("system load unavailable");
            defaults::STATUS_UNKNOWN.to_string()
        }
    }
}
