//! Command runners for the binary.
//!
//! The daemon command wires the Whisper engine into the daemon; the client
//! commands validate input locally and talk to a running daemon.

use crate::audio::wav;
use crate::config::Config;
use crate::daemon::run_until_signal;
use crate::defaults::SUPPORTED_AUDIO_FORMATS;
use crate::error::{Result, TranscriberError};
use crate::ipc::client;
use crate::ipc::protocol::{ERROR_PREFIX, Response};
use crate::stt::{WhisperConfig, WhisperEngine};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Command-line overrides for the daemon, applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct DaemonOverrides {
    pub socket: Option<PathBuf>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub drain_grace: Option<Duration>,
    pub max_pending: Option<usize>,
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/pink-transcriber/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides are applied last.
pub fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match (custom_path, Config::default_path()) {
        (Some(path), _) => Config::load(path)?,
        (None, Some(default_path)) => Config::load_or_default(&default_path)?,
        (None, None) => Config::default(),
    };
    Ok(config.with_env_overrides())
}

/// Apply daemon flags to `config`.
pub fn apply_daemon_overrides(mut config: Config, overrides: DaemonOverrides) -> Config {
    if let Some(socket) = overrides.socket {
        config.server.socket_path = socket;
    }
    if let Some(model) = overrides.model {
        config.engine.model = model;
    }
    if let Some(language) = overrides.language {
        config.engine.language = language;
    }
    if let Some(grace) = overrides.drain_grace {
        config.server.drain_grace_ms = grace.as_millis() as u64;
    }
    if overrides.max_pending.is_some() {
        config.server.max_pending_jobs = overrides.max_pending;
    }
    config
}

/// Run the daemon in the foreground until SIGINT or SIGTERM.
pub async fn run_daemon_command(config: Config) -> Result<()> {
    info!(
        version = %crate::version_string(),
        model = %config.engine.resolved_model_path().display(),
        "starting pink-transcriber daemon"
    );
    let engine = WhisperEngine::new(WhisperConfig::from(&config.engine));
    run_until_signal(config.server, Arc::new(engine)).await
}

/// Check a file before asking the daemon to transcribe it.
///
/// Returns the absolute path to send. The daemon resolves paths in its own
/// working directory, so relative paths must not go over the wire.
pub fn validate_audio_file(path: &Path) -> std::result::Result<PathBuf, String> {
    let absolute = std::path::absolute(path)
        .map_err(|e| format!("Invalid path {}: {}", path.display(), e))?;

    if !absolute.exists() {
        return Err(format!("File not found: {}", absolute.display()));
    }
    if !absolute.is_file() {
        return Err(format!("Not a file: {}", absolute.display()));
    }
    if !wav::is_supported(&absolute) {
        return Err(format!(
            "Unsupported format: {} (supported: {})",
            wav::extension_of(&absolute),
            SUPPORTED_AUDIO_FORMATS.join(", ")
        ));
    }
    Ok(absolute)
}

/// `health` subcommand: exit 0 only if the daemon answers `OK`.
pub async fn run_health_command(socket_path: &Path) -> ExitCode {
    match client::health(socket_path).await {
        Ok(Response::Ok) => {
            println!("OK");
            ExitCode::SUCCESS
        }
        Ok(Response::Loading) => report_failure("Model is loading"),
        Ok(other) => report_failure(&format!("Unexpected response: {:?}", other)),
        Err(TranscriberError::ServerNotRunning { .. }) => {
            report_failure("Server not running (socket not found)")
        }
        Err(TranscriberError::Timeout { .. }) => report_failure("Server timeout"),
        Err(e) => report_failure(&format!("Server not responding: {}", e)),
    }
}

/// `transcribe` subcommand: print the transcript on stdout.
pub async fn run_transcribe_command(socket_path: &Path, file: &Path) -> ExitCode {
    let audio_path = match validate_audio_file(file) {
        Ok(path) => path,
        Err(message) => return report_failure(&message),
    };

    match client::transcribe(socket_path, &audio_path).await {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(TranscriberError::ServerNotRunning { .. }) => report_failure("Server not running"),
        Err(e) => report_failure(&e.to_string()),
    }
}

fn report_failure(message: &str) -> ExitCode {
    if std::io::stderr().is_terminal() {
        eprintln!("{} {}", ERROR_PREFIX.red(), message);
    } else {
        eprintln!("{} {}", ERROR_PREFIX, message);
    }
    ExitCode::FAILURE
}
