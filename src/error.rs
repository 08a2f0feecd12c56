//! Error types for pink-transcriber.

use thiserror::Error;

/// Failure of a single engine operation.
///
/// The `Display` output of this type is what a client sees after `ERROR: `,
/// so messages are kept short and free of newlines.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Model not loaded")]
    NotLoaded,

    #[error("Audio file not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported audio format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Failed to load model: {message}")]
    Load { message: String },

    #[error("{message}")]
    Failed { message: String },
}

impl EngineError {
    /// Convenience constructor for a free-form engine failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum TranscriberError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Engine errors
    #[error(transparent)]
    Engine(#[from] EngineError),

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    #[error("Server not running (no socket at {path})")]
    ServerNotRunning { path: String },

    #[error("No reply from server within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// An `ERROR:` reply; holds the text after the prefix.
    #[error("{message}")]
    Remote { message: String },

    // Daemon lifecycle errors
    #[error("Another instance is already running (PID {pid}, {holder})")]
    SingletonConflict { pid: u32, holder: String },

    #[error("Lock file error: {message}")]
    LockFile { message: String },

    #[error("Startup failed: {message}")]
    Startup { message: String },

    #[error("Server busy: {pending} jobs already queued")]
    QueueFull { pending: usize },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job was abandoned before producing a result")]
    SlotAbandoned,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TranscriberError>;
