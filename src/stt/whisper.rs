//! Whisper-based transcription engine.
//!
//! # Feature Gate
//!
//! Real inference requires the `whisper` feature (and cmake at build time).
//! Without it, [`WhisperEngine::load`] fails with an explanatory message,
//! which the daemon treats as a fatal startup error.

#[cfg(feature = "whisper")]
use crate::audio::wav;
use crate::config::EngineConfig;
use crate::defaults;
use crate::error::EngineError;
use crate::stt::engine::Engine;
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperConfig {
    /// Path to the GGML model file
    pub model_path: PathBuf,
    /// Language code (e.g., "en", "de") or "auto"
    pub language: String,
    /// Number of threads for inference (None = whisper.cpp default)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models").join(defaults::DEFAULT_MODEL),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl From<&EngineConfig> for WhisperConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            model_path: config.resolved_model_path(),
            language: config.language.clone(),
            threads: config.threads,
        }
    }
}

fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Whisper engine. The context is created lazily by [`Engine::load`].
pub struct WhisperEngine {
    config: WhisperConfig,
    model_name: String,
    #[cfg(feature = "whisper")]
    context: Mutex<Option<WhisperContext>>,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl WhisperEngine {
    /// Create an unloaded engine. No file access happens until `load`.
    pub fn new(config: WhisperConfig) -> Self {
        let model_name = model_name_from_path(&config.model_path);
        Self {
            config,
            model_name,
            #[cfg(feature = "whisper")]
            context: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn check_model_file(&self) -> Result<(), EngineError> {
        if self.config.model_path.exists() {
            Ok(())
        } else {
            Err(EngineError::Load {
                message: format!(
                    "model file not found at {}",
                    self.config.model_path.display()
                ),
            })
        }
    }
}

#[cfg(feature = "whisper")]
impl Engine for WhisperEngine {
    fn load(&self) -> Result<(), EngineError> {
        let mut context = self.context.lock().map_err(|e| EngineError::Load {
            message: format!("Failed to acquire context lock: {}", e),
        })?;
        if context.is_some() {
            return Ok(());
        }

        // Route whisper.cpp output through its hooks instead of raw stderr
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        self.check_model_file()?;

        let model_path = self
            .config
            .model_path
            .to_str()
            .ok_or_else(|| EngineError::Load {
                message: "Invalid UTF-8 in model path".to_string(),
            })?;

        let mut context_params = WhisperContextParameters::default();
        context_params.flash_attn(true);
        let loaded = WhisperContext::new_with_params(model_path, context_params).map_err(|e| {
            EngineError::Load {
                message: format!("{}", e),
            }
        })?;

        tracing::debug!(model = %self.model_name, "whisper context created");
        *context = Some(loaded);
        Ok(())
    }

    fn transcribe(&self, audio_path: &Path) -> Result<String, EngineError> {
        let audio = wav::read_wav_file(audio_path)?;

        let context = self
            .context
            .lock()
            .map_err(|e| EngineError::failed(format!("Failed to acquire context lock: {}", e)))?;
        let context = context.as_ref().ok_or(EngineError::NotLoaded)?;

        let mut state = context
            .create_state()
            .map_err(|e| EngineError::failed(format!("Failed to create Whisper state: {}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.config.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio)
            .map_err(|e| EngineError::failed(format!("Transcription failed: {}", e)))?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }

        Ok(transcription.trim().to_string())
    }

    fn is_ready(&self) -> bool {
        self.context
            .lock()
            .map(|context| context.is_some())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl Engine for WhisperEngine {
    fn load(&self) -> Result<(), EngineError> {
        self.check_model_file()?;
        Err(EngineError::Load {
            message: concat!(
                "this binary was built without speech recognition. ",
                "Rebuild with the `whisper` feature (enabled by default)"
            )
            .to_string(),
        })
    }

    fn transcribe(&self, _audio_path: &Path) -> Result<String, EngineError> {
        Err(EngineError::NotLoaded)
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
