//! Daemon configuration: TOML file, environment overrides, resolved paths.

use crate::defaults;
use crate::error::{Result, TranscriberError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

/// Socket, queue, and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// Singleton lock file; a fixed per-user path when unset.
    pub lock_path: Option<PathBuf>,
    pub drain_grace_ms: u64,
    pub max_line_bytes: usize,
    /// Cap on queued jobs. `None` keeps the queue unbounded.
    pub max_pending_jobs: Option<usize>,
}

/// Transcription engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Model file name (resolved in the model directory) or absolute path.
    pub model: String,
    pub model_dir: Option<PathBuf>,
    pub language: String,
    pub threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(defaults::SOCKET_PATH),
            lock_path: None,
            drain_grace_ms: defaults::DRAIN_GRACE.as_millis() as u64,
            max_line_bytes: defaults::MAX_LINE_BYTES,
            max_pending_jobs: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            model_dir: None,
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl ServerConfig {
    /// Lock file path: explicit setting, else `pink-transcriber.lock` in
    /// `$XDG_RUNTIME_DIR`, falling back to the system temp directory.
    ///
    /// Never derived from `socket_path`, so daemons started on different
    /// sockets still exclude each other.
    pub fn resolved_lock_path(&self) -> PathBuf {
        if let Some(path) = &self.lock_path {
            return path.clone();
        }
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(defaults::LOCK_FILE_NAME)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl EngineConfig {
    /// Directory holding model files.
    ///
    /// Priority: `PINK_TRANSCRIBER_MODEL_DIR`, then `model_dir`, then
    /// `<data_dir>/pink-transcriber/models`, then `./models`.
    pub fn resolved_model_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("PINK_TRANSCRIBER_MODEL_DIR")
            && !dir.is_empty()
        {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.model_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("pink-transcriber").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }

    /// Full path of the model file.
    pub fn resolved_model_path(&self) -> PathBuf {
        let model = Path::new(&self.model);
        if model.is_absolute() {
            model.to_path_buf()
        } else {
            self.resolved_model_dir().join(model)
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranscriberError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                TranscriberError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TranscriberError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PINK_TRANSCRIBER_SOCKET → server.socket_path
    /// - PINK_TRANSCRIBER_LOCK → server.lock_path
    /// - PINK_TRANSCRIBER_MODEL → engine.model
    /// - PINK_TRANSCRIBER_LANGUAGE → engine.language
    ///
    /// PINK_TRANSCRIBER_MODEL_DIR is read at resolution time, see
    /// [`EngineConfig::resolved_model_dir`].
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(socket) = std::env::var("PINK_TRANSCRIBER_SOCKET")
            && !socket.is_empty()
        {
            self.server.socket_path = PathBuf::from(socket);
        }

        if let Ok(lock) = std::env::var("PINK_TRANSCRIBER_LOCK")
            && !lock.is_empty()
        {
            self.server.lock_path = Some(PathBuf::from(lock));
        }

        if let Ok(model) = std::env::var("PINK_TRANSCRIBER_MODEL")
            && !model.is_empty()
        {
            self.engine.model = model;
        }

        if let Ok(language) = std::env::var("PINK_TRANSCRIBER_LANGUAGE")
            && !language.is_empty()
        {
            self.engine.language = language;
        }

        self
    }

    /// Default configuration file path, `~/.config/pink-transcriber/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pink-transcriber").join("config.toml"))
    }
}
