//! Speech-to-text engine: the blocking capability the daemon serializes access to.

pub mod engine;
pub mod whisper;

pub use engine::{Engine, EngineHandle, EngineStatus, Invocation, ScriptedEngine};
pub use whisper::{WhisperConfig, WhisperEngine};
