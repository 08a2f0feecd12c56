//! Log subscriber setup for the binary.
//!
//! Everything goes to stderr; stdout carries client results only.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variables that switch on debug output when set to `1`.
/// `DEV` is the older spelling.
pub const DEBUG_ENV_VARS: &[&str] = &["VERBOSE", "DEV"];

/// True if any of [`DEBUG_ENV_VARS`] is set to `1`.
pub fn debug_requested_by_env() -> bool {
    DEBUG_ENV_VARS
        .iter()
        .any(|key| std::env::var(key).is_ok_and(|value| value == "1"))
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(quiet: bool, verbosity: u8, debug_env: bool) -> String {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) if debug_env => "debug",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    format!("warn,pink_transcriber={}", level)
}

/// Install the global subscriber. `RUST_LOG` overrides the flags.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(quiet: bool, verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        default_directive(quiet, verbosity, debug_requested_by_env()).into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .is_ok()
}
