//! Async Unix socket server: accepts connections and runs one handler task each.

use crate::defaults;
use crate::error::{Result, TranscriberError};
use crate::ipc::protocol::{Request, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Handler trait for classified requests.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the reply for one request.
    ///
    /// `None` closes the connection without writing anything.
    async fn handle(&self, request: Request) -> Option<Response>;
}

/// Remove a socket file if present. A missing file is not an error.
pub fn remove_socket_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TranscriberError::IpcSocket {
            message: format!("Failed to remove socket file {}: {}", path.display(), e),
        }),
    }
}

/// Listening Unix socket for daemon requests.
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
    max_line_bytes: usize,
}

impl std::fmt::Debug for IpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcServer")
            .field("socket_path", &self.socket_path)
            .field("max_line_bytes", &self.max_line_bytes)
            .finish_non_exhaustive()
    }
}

impl IpcServer {
    /// Bind to `socket_path`, replacing any stale socket file left behind by
    /// an unclean shutdown. Must run inside a Tokio runtime.
    pub fn bind(socket_path: PathBuf) -> Result<Self> {
        remove_socket_file(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| TranscriberError::IpcSocket {
            message: format!("Failed to bind to socket {}: {}", socket_path.display(), e),
        })?;

        Ok(Self {
            socket_path,
            listener,
            max_line_bytes: defaults::MAX_LINE_BYTES,
        })
    }

    /// Limit the request line length, terminator included.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Each connection gets its own task, so a slow request never holds up
    /// `accept`. Tasks already spawned keep running after this returns. The
    /// socket file is left in place; removing it is the caller's job.
    pub async fn serve<H>(self, handler: Arc<H>, shutdown: CancellationToken) -> Result<()>
    where
        H: RequestHandler + 'static,
    {
        let max_line_bytes = self.max_line_bytes;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, max_line_bytes).await {
                            // The peer is gone; nobody is left to tell.
                            debug!("client connection ended early: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        debug!(socket = %self.socket_path.display(), "stopped accepting connections");
        Ok(())
    }
}

/// Read one line, dispatch it, write the reply, close.
async fn handle_connection<H>(stream: UnixStream, handler: Arc<H>, max_line_bytes: usize) -> Result<()>
where
    H: RequestHandler,
{
    let (reader, mut writer) = stream.into_split();
    // One byte past the limit tells an overlong line from one that fills it exactly
    let mut reader = BufReader::new(reader).take(max_line_bytes as u64 + 1);
    let mut raw = Vec::new();

    reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let response = if raw.len() > max_line_bytes {
        Some(Response::error(format!(
            "Request line exceeds {} bytes",
            max_line_bytes
        )))
    } else {
        let line = String::from_utf8_lossy(&raw);
        handler.handle(Request::parse(&line)).await
    };

    let Some(response) = response else {
        return Ok(());
    };

    writer
        .write_all(response.to_line().as_bytes())
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;

    writer
        .shutdown()
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to close connection: {}", e),
        })?;

    Ok(())
}
