use crate::error::EngineError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Trait for the speech-to-text engine.
///
/// All methods block. The daemon never calls them from more than one thread
/// at a time, so implementations need not support concurrent invocation.
pub trait Engine: Send + Sync {
    /// Load the model. Idempotent; may be slow.
    fn load(&self) -> Result<(), EngineError>;

    /// Transcribe the audio file at `audio_path`.
    fn transcribe(&self, audio_path: &Path) -> Result<String, EngineError>;

    /// Check if the model is loaded
    fn is_ready(&self) -> bool;

    /// Human-readable engine or model name
    fn name(&self) -> &str;
}

impl<T: Engine> Engine for Arc<T> {
    fn load(&self) -> Result<(), EngineError> {
        (**self).load()
    }

    fn transcribe(&self, audio_path: &Path) -> Result<String, EngineError> {
        (**self).transcribe(audio_path)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Readiness of the engine as seen by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Loading,
    Ready,
    Failed,
}

/// Owned engine plus its readiness flag.
///
/// The flag only changes through [`EngineHandle::load`].
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    status: watch::Sender<EngineStatus>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let (status, _) = watch::channel(EngineStatus::Loading);
        Self { engine, status }
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == EngineStatus::Ready
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Shared reference for the worker loop.
    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engine)
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Load the engine on the blocking pool and record the outcome.
    pub async fn load(&self) -> Result<(), EngineError> {
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || engine.load())
            .await
            .unwrap_or_else(|e| {
                Err(EngineError::Load {
                    message: format!("load task panicked: {}", e),
                })
            });

        let status = if result.is_ok() {
            EngineStatus::Ready
        } else {
            EngineStatus::Failed
        };
        self.status.send_replace(status);
        result
    }
}

/// One completed call to [`ScriptedEngine::transcribe`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub path: PathBuf,
    pub started: Instant,
    pub finished: Instant,
}

/// Deterministic engine for tests and local experiments.
///
/// Outcomes are scripted per input path; every call is recorded so callers can
/// check ordering and overlap.
#[derive(Debug)]
pub struct ScriptedEngine {
    name: String,
    outcomes: HashMap<PathBuf, Result<String, String>>,
    default_outcome: Result<String, String>,
    load_delay: Duration,
    load_failure: Option<String>,
    transcribe_delay: Duration,
    loaded: AtomicBool,
    load_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcomes: HashMap::new(),
            default_outcome: Ok("scripted transcription".to_string()),
            load_delay: Duration::ZERO,
            load_failure: None,
            transcribe_delay: Duration::ZERO,
            loaded: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Return `text` for `path`.
    pub fn with_transcript(mut self, path: impl Into<PathBuf>, text: &str) -> Self {
        self.outcomes.insert(path.into(), Ok(text.to_string()));
        self
    }

    /// Fail with `message` for `path`.
    pub fn with_failure(mut self, path: impl Into<PathBuf>, message: &str) -> Self {
        self.outcomes.insert(path.into(), Err(message.to_string()));
        self
    }

    /// Outcome for paths that were not scripted.
    pub fn with_default_transcript(mut self, text: &str) -> Self {
        self.default_outcome = Ok(text.to_string());
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_load_failure(mut self, message: &str) -> Self {
        self.load_failure = Some(message.to_string());
        self
    }

    pub fn with_transcribe_delay(mut self, delay: Duration) -> Self {
        self.transcribe_delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Paths in the order the engine started on them.
    pub fn transcribed_paths(&self) -> Vec<PathBuf> {
        self.invocations().into_iter().map(|i| i.path).collect()
    }

    /// Highest number of simultaneous `transcribe` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

impl Engine for ScriptedEngine {
    fn load(&self) -> Result<(), EngineError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }
        std::thread::sleep(self.load_delay);
        if let Some(message) = &self.load_failure {
            return Err(EngineError::Load {
                message: message.clone(),
            });
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn transcribe(&self, audio_path: &Path) -> Result<String, EngineError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(EngineError::NotLoaded);
        }

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let started = Instant::now();
        std::thread::sleep(self.transcribe_delay);
        let outcome = self
            .outcomes
            .get(audio_path)
            .unwrap_or(&self.default_outcome)
            .clone();
        let finished = Instant::now();

        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Invocation {
                path: audio_path.to_path_buf(),
                started,
                finished,
            });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        outcome.map_err(EngineError::failed)
    }

    fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(engine: ScriptedEngine) -> ScriptedEngine {
        engine.load().expect("scripted load");
        engine
    }

    #[test]
    fn test_scripted_engine_returns_transcript() {
        let engine = loaded(ScriptedEngine::new("test").with_transcript("/tmp/a.wav", "hello world"));

        let result = engine.transcribe(Path::new("/tmp/a.wav"));
        assert_eq!(result.unwrap(), "hello world");
    }

    #[test]
    fn test_scripted_engine_returns_failure_message() {
        let engine =
            loaded(ScriptedEngine::new("test").with_failure("/tmp/missing.wav", "file not found"));

        let error = engine
            .transcribe(Path::new("/tmp/missing.wav"))
            .unwrap_err();
        assert_eq!(error.to_string(), "file not found");
    }

    #[test]
    fn test_scripted_engine_default_outcome() {
        let engine = loaded(ScriptedEngine::new("test").with_default_transcript("fallback"));
        assert_eq!(
            engine.transcribe(Path::new("/tmp/other.wav")).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_transcribe_before_load_fails() {
        let engine = ScriptedEngine::new("test");
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.transcribe(Path::new("/tmp/a.wav")),
            Err(EngineError::NotLoaded)
        ));
    }

    #[test]
    fn test_load_is_idempotent() {
        let engine = ScriptedEngine::new("test");
        engine.load().unwrap();
        engine.load().unwrap();
        assert!(engine.is_ready());
        assert_eq!(engine.load_calls(), 2);
    }

    #[test]
    fn test_load_failure() {
        let engine = ScriptedEngine::new("test").with_load_failure("out of memory");
        let error = engine.load().unwrap_err();
        assert_eq!(error.to_string(), "Failed to load model: out of memory");
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_invocations_recorded_in_order() {
        let engine = loaded(ScriptedEngine::new("test"));
        engine.transcribe(Path::new("/tmp/1.wav")).unwrap();
        engine.transcribe(Path::new("/tmp/2.wav")).unwrap();

        assert_eq!(
            engine.transcribed_paths(),
            vec![PathBuf::from("/tmp/1.wav"), PathBuf::from("/tmp/2.wav")]
        );
        assert_eq!(engine.max_concurrent(), 1);
    }

    #[test]
    fn test_engine_trait_is_object_safe() {
        let engine: Box<dyn Engine> = Box::new(loaded(ScriptedEngine::new("boxed")));
        assert_eq!(engine.name(), "boxed");
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn test_handle_load_marks_ready() {
        let handle = EngineHandle::new(Arc::new(ScriptedEngine::new("test")));
        assert_eq!(handle.status(), EngineStatus::Loading);
        assert!(!handle.is_ready());

        handle.load().await.unwrap();
        assert_eq!(handle.status(), EngineStatus::Ready);
        assert!(handle.engine().is_ready());
    }

    #[tokio::test]
    async fn test_handle_load_failure_marks_failed() {
        let handle = EngineHandle::new(Arc::new(
            ScriptedEngine::new("test").with_load_failure("corrupt model"),
        ));

        let mut status = handle.subscribe();
        assert!(handle.load().await.is_err());
        assert_eq!(handle.status(), EngineStatus::Failed);
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), EngineStatus::Failed);
    }
}
