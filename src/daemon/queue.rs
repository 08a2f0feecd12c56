//! FIFO job queue: many submitters, one receiver.

use crate::daemon::slot::{PendingResult, SlotFiller, result_slot};
use crate::error::{EngineError, Result, TranscriberError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// What the worker delivers for one job.
pub type JobOutcome = std::result::Result<String, EngineError>;

/// One queued transcription request.
#[derive(Debug)]
pub struct Job {
    pub input: PathBuf,
    pub slot: SlotFiller<JobOutcome>,
}

#[derive(Debug)]
pub enum QueueItem {
    Job(Job),
    /// Stop after everything queued ahead of this marker.
    Shutdown,
}

#[derive(Debug, Default)]
struct QueueShared {
    pending: AtomicUsize,
    closed: AtomicBool,
}

/// Create a queue. `max_pending` caps jobs waiting to be picked up; `None`
/// leaves the queue unbounded.
pub fn job_queue(max_pending: Option<usize>) -> (JobSubmitter, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(QueueShared::default());
    (
        JobSubmitter {
            tx,
            shared: Arc::clone(&shared),
            max_pending,
        },
        JobReceiver { rx, shared },
    )
}

/// Producer handle. Cheap to clone, one per connection handler.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    tx: mpsc::UnboundedSender<QueueItem>,
    shared: Arc<QueueShared>,
    max_pending: Option<usize>,
}

impl JobSubmitter {
    /// Enqueue a job for `input` and return the handle to its outcome.
    ///
    /// # Errors
    /// - `QueueFull` when the optional cap is reached
    /// - `QueueClosed` once shutdown has been requested or the worker is gone
    pub fn submit(&self, input: PathBuf) -> Result<PendingResult<JobOutcome>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TranscriberError::QueueClosed);
        }
        self.reserve()?;

        let (slot, pending) = result_slot();
        if self
            .tx
            .send(QueueItem::Job(Job { input, slot }))
            .is_err()
        {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(TranscriberError::QueueClosed);
        }
        Ok(pending)
    }

    fn reserve(&self) -> Result<()> {
        match self.max_pending {
            None => {
                self.shared.pending.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Some(max) => self
                .shared
                .pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|pending| TranscriberError::QueueFull { pending }),
        }
    }

    /// Push the shutdown marker and refuse further submissions.
    ///
    /// Jobs already queued stay ahead of the marker and are still processed.
    pub fn request_shutdown(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.tx
            .send(QueueItem::Shutdown)
            .map_err(|_| TranscriberError::QueueClosed)
    }

    /// Jobs submitted but not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }
}

/// Consumer handle, owned by the worker loop.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    shared: Arc<QueueShared>,
}

impl JobReceiver {
    /// Next item in submission order. `None` once every submitter is dropped
    /// and the queue is empty.
    pub async fn next(&mut self) -> Option<QueueItem> {
        let item = self.rx.recv().await;
        if let Some(QueueItem::Job(_)) = item {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }
}
