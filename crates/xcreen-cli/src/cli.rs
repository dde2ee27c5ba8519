use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// xcreen: screen-share and audio session orchestration.
#[derive(Parser, Debug)]
#[command(name = "xcreen", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error) or a full filter
    /// directive.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or clear cached room state.
    Room {
        #[command(subcommand)]
        action: RoomCommand,
    },
    /// Print the effective configuration as JSON.
    Config,
    /// Run a host and some viewers in-process over a loopback transport.
    Demo {
        /// Number of viewers to join.
        #[arg(long, default_value_t = 2)]
        viewers: usize,

        /// Room code to host. A fresh one is generated when omitted.
        #[arg(long)]
        room: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RoomCommand {
    /// Show a cached room, or the most recent one.
    Show {
        #[arg(long)]
        room: Option<String>,
    },
    /// Forget a cached room.
    Clear {
        #[arg(long)]
        room: String,
    },
}

pub fn parse() -> Args {
    Args::parse()
}

/// Filter directive for `--log-level`. Bare levels apply to the xcreen
/// crates only.
pub fn log_directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("xcreen={}", level.to_ascii_lowercase())
    }
}
