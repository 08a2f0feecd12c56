//! pink-transcriber - local speech-to-text daemon
//!
//! A long-lived process holds one loaded model and serves transcription
//! requests over a Unix socket. Requests from any number of clients are
//! queued and handed to the engine one at a time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod stt;
pub mod sys;

// Binary composition root
#[cfg(feature = "cli")]
pub mod app;

// Core traits
pub use ipc::server::RequestHandler;
pub use stt::Engine;

// Daemon
pub use daemon::{Daemon, DrainOutcome, RunningDaemon, run_daemon, run_until_signal};

// Error handling
pub use error::{EngineError, Result, TranscriberError};

// Config
pub use config::{Config, EngineConfig, ServerConfig};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
