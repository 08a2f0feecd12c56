//! Command-line interface for pink-transcriber
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Local speech-to-text daemon and client
#[derive(Parser, Debug)]
#[command(
    name = "pink-transcriber",
    version,
    about = "Local speech-to-text daemon and client"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Daemon socket path (default: /tmp/pink-transcriber.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Suppress log output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a grace period.
///
/// Supports any duration format accepted by `humantime` (`500ms`, `2s`,
/// `1m30s`); a bare number is taken as seconds.
fn parse_grace(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the transcription daemon in the foreground
    Daemon {
        /// Model file name or absolute path (default: ggml-base.bin)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Language code (default: auto-detect). Examples: auto, en, de
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// How long queued jobs may keep running after a shutdown signal
        #[arg(long, value_name = "DURATION", value_parser = parse_grace)]
        drain_grace: Option<Duration>,

        /// Reject transcription requests once this many are waiting
        #[arg(long, value_name = "N")]
        max_pending: Option<usize>,
    },

    /// Check whether the daemon is running and its model is loaded
    Health,

    /// Transcribe an audio file through the running daemon
    Transcribe {
        /// Audio file to transcribe
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
