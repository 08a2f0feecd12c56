//! IPC client for talking to a running daemon.

use crate::defaults;
use crate::error::{Result, TranscriberError};
use crate::ipc::protocol::{Request, Response};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one request and read the single-line reply.
///
/// A missing socket file is reported as [`TranscriberError::ServerNotRunning`]
/// without attempting to connect. `timeout` bounds the whole exchange; `None`
/// waits as long as the daemon takes.
///
/// # Errors
/// Returns `TranscriberError::IpcConnection` if the exchange fails or the
/// daemon closes the connection without replying.
pub async fn send_request(
    socket_path: &Path,
    request: &Request,
    timeout: Option<Duration>,
) -> Result<Response> {
    if !socket_path.exists() {
        return Err(TranscriberError::ServerNotRunning {
            path: socket_path.display().to_string(),
        });
    }

    let exchange = exchange(socket_path, request);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| TranscriberError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            })?,
        None => exchange.await,
    }
}

async fn exchange(socket_path: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to connect to daemon: {}", e),
        })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer
        .write_all(request.to_line().as_bytes())
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to write request: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    let mut response_line = String::new();
    let read = reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| TranscriberError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    if read == 0 {
        return Err(TranscriberError::IpcConnection {
            message: "Daemon closed the connection without a reply".to_string(),
        });
    }

    Ok(Response::parse(&response_line))
}

/// Probe readiness. Returns [`Response::Ok`] or [`Response::Loading`].
pub async fn health(socket_path: &Path) -> Result<Response> {
    match send_request(socket_path, &Request::Health, Some(defaults::HEALTH_TIMEOUT)).await? {
        Response::Error(message) => Err(TranscriberError::Remote { message }),
        Response::Transcript(other) => Err(TranscriberError::IpcProtocol {
            message: format!("Unexpected health reply: {}", other),
        }),
        status => Ok(status),
    }
}

/// Ask the daemon to transcribe `audio_path` and wait for the text.
///
/// # Errors
/// An `ERROR:` reply becomes [`TranscriberError::Remote`] carrying the text
/// after the prefix.
pub async fn transcribe(socket_path: &Path, audio_path: &Path) -> Result<String> {
    let request = Request::Transcribe(audio_path.to_path_buf());
    match send_request(socket_path, &request, None).await? {
        Response::Error(message) => Err(TranscriberError::Remote { message }),
        Response::Transcript(text) => Ok(text),
        // A transcript that reads "OK" or "LOADING" is still a transcript
        Response::Ok => Ok("OK".to_string()),
        Response::Loading => Ok("LOADING".to_string()),
    }
}
