//! Request handler implementation for the daemon.

use crate::daemon::queue::JobSubmitter;
use crate::daemon::state::Lifecycle;
use crate::error::TranscriberError;
use crate::ipc::protocol::{NO_AUDIO_PATH, Request, Response};
use crate::ipc::server::RequestHandler;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers health probes from the lifecycle state and routes transcription
/// requests through the job queue.
pub struct DaemonRequestHandler {
    lifecycle: Arc<Lifecycle>,
    jobs: JobSubmitter,
}

impl DaemonRequestHandler {
    pub fn new(lifecycle: Arc<Lifecycle>, jobs: JobSubmitter) -> Self {
        Self { lifecycle, jobs }
    }

    fn health(&self) -> Response {
        if self.lifecycle.is_ready() {
            Response::Ok
        } else {
            Response::Loading
        }
    }

    async fn transcribe(&self, path: &Path) -> Option<Response> {
        debug!(file = %file_name(path), queued = self.jobs.pending(), "request received");

        let pending = match self.jobs.submit(path.to_path_buf()) {
            Ok(pending) => pending,
            Err(TranscriberError::QueueClosed) => {
                return Some(Response::error("Server is shutting down"));
            }
            Err(e) => {
                warn!(file = %file_name(path), "rejected request: {}", e);
                return Some(Response::error(e.to_string()));
            }
        };

        match pending.await_result().await {
            Ok(Ok(text)) => Some(Response::Transcript(text)),
            Ok(Err(e)) => Some(Response::error(e.to_string())),
            // Worker was cancelled mid-job; the client sees a closed connection
            Err(_) => {
                debug!(file = %file_name(path), "job abandoned during shutdown");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for DaemonRequestHandler {
    async fn handle(&self, request: Request) -> Option<Response> {
        match request {
            Request::Health => Some(self.health()),
            Request::Empty => Some(Response::error(NO_AUDIO_PATH)),
            Request::Transcribe(path) => self.transcribe(&path).await,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
