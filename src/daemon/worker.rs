//! The single worker loop: the only caller of [`Engine::transcribe`].

use crate::daemon::queue::{Job, JobOutcome, JobReceiver, QueueItem};
use crate::defaults::LOG_PREVIEW_CHARS;
use crate::error::EngineError;
use crate::stt::{Engine, EngineStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Process jobs one at a time until the shutdown marker arrives or every
/// submitter is gone. Returns the number of jobs processed.
///
/// Jobs submitted while `status` is still `Loading` stay queued until the load
/// settles, so the engine is never transcribing while it loads. The engine
/// call runs on the blocking pool so the async runtime keeps accepting
/// connections meanwhile. The loop awaits each call before taking the next
/// job, so at most one is ever in flight.
pub async fn run_worker(
    mut receiver: JobReceiver,
    engine: Arc<dyn Engine>,
    mut status: watch::Receiver<EngineStatus>,
) -> usize {
    // A dropped sender means no load is coming; carry on regardless
    if status
        .wait_for(|s| *s != EngineStatus::Loading)
        .await
        .is_err()
    {
        debug!("engine status channel closed before load settled");
    }

    let mut processed = 0;

    loop {
        match receiver.next().await {
            Some(QueueItem::Job(job)) => {
                process_job(job, &engine).await;
                processed += 1;
            }
            Some(QueueItem::Shutdown) => {
                debug!(processed, "worker reached shutdown marker");
                break;
            }
            None => {
                debug!(processed, "job queue closed");
                break;
            }
        }
    }

    processed
}

async fn process_job(job: Job, engine: &Arc<dyn Engine>) {
    let Job { input, slot } = job;
    let started = Instant::now();

    let engine = Arc::clone(engine);
    let path = input.clone();
    let outcome: JobOutcome = tokio::task::spawn_blocking(move || engine.transcribe(&path))
        .await
        .unwrap_or_else(|e| {
            Err(EngineError::failed(format!(
                "Transcription task panicked: {}",
                e
            )))
        });

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(text) => debug!(
            file = %input.display(),
            elapsed_ms,
            preview = %preview(text),
            "transcription finished"
        ),
        Err(e) => warn!(file = %input.display(), elapsed_ms, "transcription failed: {}", e),
    }

    if !slot.fulfill(outcome) {
        debug!(file = %input.display(), "client went away before the result was ready");
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    if text.chars().nth(LOG_PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}
