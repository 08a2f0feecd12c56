//! Daemon mode: singleton guard, socket server, job queue and worker.
//!
//! Startup runs in a fixed order: take the singleton lock, clear a stale
//! socket, start the worker, bind the socket, then load the engine in the
//! background. The socket is live before the load begins, so health probes
//! answer `LOADING` instead of failing to connect.

pub mod handler;
pub mod queue;
pub mod singleton;
pub mod slot;
pub mod state;
pub mod worker;

use crate::config::ServerConfig;
use crate::defaults::SINGLETON_IDENTIFIERS;
use crate::error::{EngineError, Result, TranscriberError};
use crate::ipc::server::{IpcServer, remove_socket_file};
use crate::stt::{Engine, EngineHandle};
use handler::DaemonRequestHandler;
use queue::{JobSubmitter, job_queue};
use singleton::SingletonGuard;
use state::{Lifecycle, LifecycleState};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the worker finished during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Everything queued ahead of the shutdown marker was processed.
    Completed { processed: usize },
    /// The worker stopped before the queue was drained: the grace period
    /// ran out and it was cancelled, or it died.
    Abandoned,
}

/// Daemon ready to start: server settings plus an unloaded engine.
pub struct Daemon {
    config: ServerConfig,
    engine: Arc<dyn Engine>,
}

impl Daemon {
    pub fn new(config: ServerConfig, engine: Arc<dyn Engine>) -> Self {
        Self { config, engine }
    }

    /// Bring the daemon up to the point where it accepts connections and the
    /// engine is loading in the background.
    ///
    /// # Errors
    /// - `SingletonConflict` if another instance holds the lock; nothing
    ///   else is touched in that case
    /// - `IpcSocket` if the stale socket cannot be removed or binding fails
    pub async fn start(self) -> Result<RunningDaemon> {
        let Self { config, engine } = self;
        let lifecycle = Arc::new(Lifecycle::new());

        let guard = SingletonGuard::acquire(&config.resolved_lock_path(), SINGLETON_IDENTIFIERS)?;

        remove_socket_file(&config.socket_path)?;

        let engine = Arc::new(EngineHandle::new(engine));
        let (jobs, receiver) = job_queue(config.max_pending_jobs);
        let mut worker = tokio::spawn(worker::run_worker(
            receiver,
            engine.engine(),
            engine.subscribe(),
        ));

        let server = match IpcServer::bind(config.socket_path.clone()) {
            Ok(server) => server.with_max_line_bytes(config.max_line_bytes),
            Err(e) => {
                if jobs.request_shutdown().is_err() {
                    debug!("worker already gone");
                }
                if tokio::time::timeout(config.drain_grace(), &mut worker)
                    .await
                    .is_err()
                {
                    worker.abort();
                }
                lifecycle.advance(LifecycleState::Stopped)?;
                return Err(e);
            }
        };
        lifecycle.advance(LifecycleState::AcceptingConnections)?;
        info!(socket = %config.socket_path.display(), "listening");

        let accept_token = CancellationToken::new();
        let handler = Arc::new(DaemonRequestHandler::new(
            Arc::clone(&lifecycle),
            jobs.clone(),
        ));
        let acceptor = tokio::spawn(server.serve(handler, accept_token.clone()));

        lifecycle.advance(LifecycleState::EngineLoading)?;
        let loader = tokio::spawn(load_engine(engine, Arc::clone(&lifecycle)));

        Ok(RunningDaemon {
            socket_path: config.socket_path.clone(),
            drain_grace: config.drain_grace(),
            lifecycle,
            jobs,
            accept_token,
            acceptor,
            worker,
            loader: Some(loader),
            guard,
        })
    }
}

async fn load_engine(
    engine: Arc<EngineHandle>,
    lifecycle: Arc<Lifecycle>,
) -> std::result::Result<(), EngineError> {
    info!(model = %engine.name(), "loading model");
    let started = Instant::now();
    engine.load().await?;

    info!(
        model = %engine.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "model loaded"
    );
    if let Err(e) = lifecycle.advance(LifecycleState::Ready) {
        // Shutdown began while the model was loading
        debug!("not entering ready state: {}", e);
    }
    Ok(())
}

/// A started daemon. Call [`RunningDaemon::shutdown`] to stop it cleanly.
pub struct RunningDaemon {
    socket_path: PathBuf,
    drain_grace: Duration,
    lifecycle: Arc<Lifecycle>,
    jobs: JobSubmitter,
    accept_token: CancellationToken,
    acceptor: JoinHandle<Result<()>>,
    worker: JoinHandle<usize>,
    loader: Option<JoinHandle<std::result::Result<(), EngineError>>>,
    guard: SingletonGuard,
}

impl RunningDaemon {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn lock_path(&self) -> &Path {
        self.guard.path()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Wait for the background engine load to finish.
    ///
    /// Cancel-safe: dropping the future leaves the load running.
    ///
    /// # Errors
    /// Returns `Startup` if the engine failed to load. The daemon must then be
    /// shut down; it never reports ready.
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        if let Some(loader) = self.loader.as_mut() {
            let outcome = loader.await;
            self.loader = None;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(TranscriberError::Startup {
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(TranscriberError::Startup {
                        message: format!("engine load task failed: {}", e),
                    });
                }
            }
        }

        if self.lifecycle.is_ready() {
            Ok(())
        } else {
            Err(TranscriberError::Startup {
                message: "engine did not become ready".to_string(),
            })
        }
    }

    /// Drain and stop.
    ///
    /// Stops accepting, lets the worker finish what is queued within the
    /// grace period, then removes the socket and releases the lock.
    /// Connections already accepted keep running and get their replies if
    /// their jobs finish in time.
    pub async fn shutdown(self) -> DrainOutcome {
        let Self {
            socket_path,
            drain_grace,
            lifecycle,
            jobs,
            accept_token,
            acceptor,
            mut worker,
            loader,
            guard,
        } = self;

        if let Err(e) = lifecycle.advance(LifecycleState::Draining) {
            debug!("{}", e);
        }
        info!(pending = jobs.pending(), "draining");

        accept_token.cancel();
        match acceptor.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("acceptor stopped with error: {}", e),
            Err(e) => warn!("acceptor task failed: {}", e),
        }

        if jobs.request_shutdown().is_err() {
            debug!("worker already gone");
        }

        let outcome = match tokio::time::timeout(drain_grace, &mut worker).await {
            Ok(joined) => drain_outcome(joined),
            Err(_) => {
                warn!(
                    grace_ms = drain_grace.as_millis() as u64,
                    "grace period elapsed; abandoning queued work"
                );
                worker.abort();
                DrainOutcome::Abandoned
            }
        };

        if let Some(loader) = loader {
            loader.abort();
        }

        if let Err(e) = remove_socket_file(&socket_path) {
            warn!("{}", e);
        }
        drop(guard);

        if let Err(e) = lifecycle.advance(LifecycleState::Stopped) {
            debug!("{}", e);
        }
        info!("daemon stopped");
        outcome
    }
}

fn drain_outcome(joined: std::result::Result<usize, JoinError>) -> DrainOutcome {
    match joined {
        Ok(processed) => DrainOutcome::Completed { processed },
        Err(e) => {
            warn!("worker task failed: {}", e);
            DrainOutcome::Abandoned
        }
    }
}

/// Run the daemon until `shutdown` resolves.
///
/// # Errors
/// Singleton conflicts, socket failures and engine load failures are fatal
/// and returned after cleanup.
pub async fn run_daemon<F>(config: ServerConfig, engine: Arc<dyn Engine>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut daemon = Daemon::new(config, engine).start().await?;
    tokio::pin!(shutdown);

    enum Startup {
        Settled(Result<()>),
        Interrupted,
    }

    let startup = tokio::select! {
        settled = daemon.wait_until_ready() => Startup::Settled(settled),
        _ = &mut shutdown => Startup::Interrupted,
    };

    match startup {
        Startup::Settled(Ok(())) => {
            info!("ready");
            shutdown.await;
        }
        Startup::Settled(Err(e)) => {
            error!("{}", e);
            daemon.shutdown().await;
            return Err(e);
        }
        Startup::Interrupted => info!("shutdown requested while the model was loading"),
    }

    daemon.shutdown().await;
    Ok(())
}

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run_until_signal(config: ServerConfig, engine: Arc<dyn Engine>) -> Result<()> {
    run_daemon(config, engine, wait_for_signal()).await
}

async fn wait_for_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                error!("Error setting up signal handler: {}", e);
            }
            info!("received SIGTERM, shutting down");
        }
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        TranscriberError::Other(format!("Failed to register SIGTERM handler: {}", e))
    })?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}
