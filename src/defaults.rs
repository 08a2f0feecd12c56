//! Default configuration constants for pink-transcriber.

use std::time::Duration;

/// Well-known socket path shared by the daemon and its clients.
pub const SOCKET_PATH: &str = "/tmp/pink-transcriber.sock";

/// Singleton lock file name, placed in the user's runtime directory.
///
/// Independent of the socket path: one daemon per user, whichever socket it
/// serves.
pub const LOCK_FILE_NAME: &str = "pink-transcriber.lock";

/// How long the worker may keep draining queued jobs after a shutdown signal.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on one request line, terminator included.
///
/// Requests are a keyword or an absolute path, so this is generous.
pub const MAX_LINE_BYTES: usize = 4096;

/// How long `health` waits for the daemon before giving up.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default model file, resolved inside the model directory.
pub const DEFAULT_MODEL: &str = "ggml-base.bin";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Sample rate the engine expects.
pub const SAMPLE_RATE: u32 = 16000;

/// Audio file extensions the engine can decode (lowercase, with dot).
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &[".wav"];

/// Process names under which a running daemon may appear.
pub const SINGLETON_IDENTIFIERS: &[&str] =
    &["pink-transcriber", "pink_transcriber", "Pink Transcriber"];

/// Length of the transcript preview written to debug logs.
pub const LOG_PREVIEW_CHARS: usize = 50;
