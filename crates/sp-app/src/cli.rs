use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// snorepillow: snore detection and adjustable pillow controller.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// In-memory pins and a synthetic tone instead of GPIO and microphone.
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// Detections and log lines are appended here, one JSON object per line.
    #[arg(long, default_value = "events.jsonl")]
    pub events: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run until interrupted, reading operator commands from stdin.
    Run {
        /// Start automatic detection immediately.
        #[arg(long, default_value_t = false)]
        auto: bool,

        /// Pause after a detection, minutes (1-60).
        #[arg(long)]
        delay: Option<u32>,
    },
    /// One capture and classification; waits for a triggered response.
    Once,
    /// Deflate, then inflate to level 1, 2 or 3.
    Pillow { level: u8 },
    /// Run the deflation channel.
    Deflate,
    /// Print system info, settings and status as JSON.
    Status,
}

impl Cli {
    /// `run` without auto-start when no subcommand is given.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run {
            auto: false,
            delay: None,
        })
    }
}
