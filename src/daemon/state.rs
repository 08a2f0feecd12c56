//! Server lifecycle state machine.

use crate::error::{Result, TranscriberError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Lifecycle phases, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    AcceptingConnections,
    EngineLoading,
    Ready,
    Draining,
    Stopped,
}

impl LifecycleState {
    fn can_advance_to(self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Starting, AcceptingConnections)
                | (AcceptingConnections, EngineLoading)
                | (EngineLoading, Ready)
                | (Starting | AcceptingConnections | EngineLoading | Ready, Draining)
                | (Starting | Draining, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::AcceptingConnections => "accepting connections",
            Self::EngineLoading => "engine loading",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared lifecycle state with change notification.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    reached_ready: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            state,
            reached_ready: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Move to `next`, rejecting anything but the forward transitions.
    pub fn advance(&self, next: LifecycleState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if !current.can_advance_to(next) {
                outcome = Err(TranscriberError::InvalidTransition {
                    from: current.to_string(),
                    to: next.to_string(),
                });
                return false;
            }
            if next == LifecycleState::Ready {
                self.reached_ready.store(true, Ordering::Release);
            }
            *current = next;
            true
        });
        outcome
    }

    /// Whether health probes should answer `OK`.
    ///
    /// Once `Ready` has been entered this stays true, draining included.
    pub fn is_ready(&self) -> bool {
        self.reached_ready.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Wait until the state is `target` or later.
    pub async fn wait_for(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        match rx.wait_for(|state| *state >= target).await {
            Ok(state) => *state,
            Err(_) => self.current(),
        }
    }
}
