use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voiceclock::app;
use voiceclock::cli::{Cli, Commands, ConfigAction};
use voiceclock::config::Config;
use voiceclock::dispatch::ContentContext;
use voiceclock::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.audio.device = Some(device);
    }
    if cli.interrupt {
        config.interrupt.enabled = true;
    }

    match cli.command {
        None => {
            let orchestrator = app::live_assistant(&config, Some(content()))?;
            run_until_signal(orchestrator).await?;
        }
        Some(Commands::Devices) => list_audio_devices()?,
        Some(Commands::Say { text }) => {
            tokio::task::spawn_blocking(move || app::say(&config, &text)).await??;
        }
        Some(Commands::Ask { text }) => {
            tokio::task::spawn_blocking(move || app::ask(&config, &text, Some(content()))).await??;
        }
        Some(Commands::Replay { path }) => {
            let orchestrator = app::replay_assistant(&config, &path, Some(content()))
                .with_context(|| format!("cannot replay {}", path.display()))?;
            run_until_signal(orchestrator).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                if config.chat.api_key.is_some() {
                    config.chat.api_key = Some("<redacted>".to_string());
                }
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Path => println!("{}", Config::default_path().display()),
        },
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the flags pick the level for this crate.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voiceclock={level},warn")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn content() -> Arc<dyn ContentContext> {
    Arc::new(app::sample_content())
}

/// Run the control loop on a blocking thread until it stops or Ctrl-C.
async fn run_until_signal(orchestrator: Orchestrator) -> Result<()> {
    let shutdown = orchestrator.shutdown_handle();
    let mut task = tokio::task::spawn_blocking(move || orchestrator.run());

    let summary = tokio::select! {
        result = &mut task => result??,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("shutting down");
                    shutdown.shutdown();
                }
                Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
            }
            task.await??
        }
    };

    tracing::info!(interactions = summary.len(), "voice control stopped");
    Ok(())
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = voiceclock::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("device listing requires the cpal-audio feature; use `arecord -l`")
}
