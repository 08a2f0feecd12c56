//! Write-once cell carrying a job's outcome from the worker to its handler.

use crate::error::{Result, TranscriberError};
use tokio::sync::oneshot;

/// Create a connected filler/reader pair.
///
/// Both halves are consumed by their only operation, so a slot is fulfilled
/// at most once and read at most once.
pub fn result_slot<T>() -> (SlotFiller<T>, PendingResult<T>) {
    let (tx, rx) = oneshot::channel();
    (SlotFiller { tx }, PendingResult { rx })
}

/// Write half, owned by the queued job.
#[derive(Debug)]
pub struct SlotFiller<T> {
    tx: oneshot::Sender<T>,
}

impl<T> SlotFiller<T> {
    /// Deliver the outcome.
    ///
    /// Returns `false` when the reader is already gone; the outcome is dropped.
    pub fn fulfill(self, outcome: T) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// True once the reader has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read half, owned by the request handler.
#[derive(Debug)]
pub struct PendingResult<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> PendingResult<T> {
    /// Suspend until the slot is fulfilled.
    ///
    /// # Errors
    /// Returns [`TranscriberError::SlotAbandoned`] if the filler is dropped
    /// unfulfilled, which happens when the worker is cancelled mid-job.
    pub async fn await_result(self) -> Result<T> {
        self.rx.await.map_err(|_| TranscriberError::SlotAbandoned)
    }
}
