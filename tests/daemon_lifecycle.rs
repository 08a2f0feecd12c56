//! End-to-end daemon behavior over a real Unix socket with a scripted engine.

use pink_transcriber::config::ServerConfig;
use pink_transcriber::daemon::state::LifecycleState;
use pink_transcriber::daemon::{Daemon, DrainOutcome, RunningDaemon, run_daemon};
use pink_transcriber::error::TranscriberError;
use pink_transcriber::ipc::client;
use pink_transcriber::ipc::protocol::Response;
use pink_transcriber::stt::ScriptedEngine;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

fn server_config(dir: &TempDir, grace: Duration) -> ServerConfig {
    ServerConfig {
        socket_path: dir.path().join("pink-transcriber.sock"),
        lock_path: Some(dir.path().join("pink-transcriber.lock")),
        drain_grace_ms: grace.as_millis() as u64,
        ..Default::default()
    }
}

async fn start(dir: &TempDir, engine: &Arc<ScriptedEngine>) -> RunningDaemon {
    let engine: Arc<ScriptedEngine> = Arc::clone(engine);
    Daemon::new(server_config(dir, Duration::from_secs(2)), engine)
        .start()
        .await
        .unwrap()
}

async fn start_ready(dir: &TempDir, engine: &Arc<ScriptedEngine>) -> RunningDaemon {
    let mut daemon = start(dir, engine).await;
    daemon.wait_until_ready().await.unwrap();
    daemon
}

/// Send raw bytes, return everything the daemon writes before closing.
async fn exchange(socket_path: &Path, line: &str) -> String {
    let mut stream = UnixStream::connect(socket_path).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

fn spawn_exchange(socket_path: &Path, line: &str) -> JoinHandle<String> {
    let socket_path = socket_path.to_path_buf();
    let line = line.to_string();
    tokio::spawn(async move { exchange(&socket_path, &line).await })
}

#[tokio::test]
async fn transcript_is_returned_verbatim() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new("test").with_transcript("/tmp/a.wav", "hello world"));
    let daemon = start_ready(&dir, &engine).await;

    assert_eq!(exchange(daemon.socket_path(), "/tmp/a.wav\n").await, "hello world\n");

    daemon.shutdown().await;
}

#[tokio::test]
async fn engine_failure_becomes_error_line() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_failure("/tmp/missing.wav", "file not found"));
    let daemon = start_ready(&dir, &engine).await;

    assert_eq!(
        exchange(daemon.socket_path(), "/tmp/missing.wav\n").await,
        "ERROR: file not found\n"
    );

    // The failure is local to that request
    assert_eq!(
        exchange(daemon.socket_path(), "/tmp/other.wav\n").await,
        "scripted transcription\n"
    );

    daemon.shutdown().await;
}

#[tokio::test]
async fn empty_line_is_rejected_without_a_job() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new("test"));
    let daemon = start_ready(&dir, &engine).await;

    assert_eq!(
        exchange(daemon.socket_path(), "\n").await,
        "ERROR: No audio path provided\n"
    );
    assert_eq!(
        exchange(daemon.socket_path(), "   \n").await,
        "ERROR: No audio path provided\n"
    );
    assert!(engine.invocations().is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn health_reports_loading_then_ok() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new("slow").with_load_delay(Duration::from_millis(300)));
    let mut daemon = start(&dir, &engine).await;

    // Socket is live before the engine is
    assert_eq!(exchange(daemon.socket_path(), "HEALTH\n").await, "LOADING\n");
    assert_eq!(
        client::health(daemon.socket_path()).await.unwrap(),
        Response::Loading
    );

    daemon.wait_until_ready().await.unwrap();
    for _ in 0..5 {
        assert_eq!(exchange(daemon.socket_path(), "HEALTH\n").await, "OK\n");
    }
    assert!(engine.invocations().is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn request_during_loading_waits_for_engine() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        ScriptedEngine::new("slow")
            .with_load_delay(Duration::from_millis(200))
            .with_transcript("/tmp/early.wav", "worth the wait"),
    );
    let mut daemon = start(&dir, &engine).await;

    let early = spawn_exchange(daemon.socket_path(), "/tmp/early.wav\n");
    assert_eq!(early.await.unwrap(), "worth the wait\n");

    daemon.wait_until_ready().await.unwrap();
    daemon.shutdown().await;
}

#[tokio::test]
async fn jobs_run_in_submission_order_without_overlap() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(60)));
    let daemon = start_ready(&dir, &engine).await;

    let mut clients = Vec::new();
    for name in ["a", "b", "c"] {
        clients.push(spawn_exchange(daemon.socket_path(), &format!("/tmp/{}.wav\n", name)));
        // Space submissions so the enqueue order is known
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    for client in clients {
        assert_eq!(client.await.unwrap(), "scripted transcription\n");
    }

    assert_eq!(
        engine.transcribed_paths(),
        vec![
            PathBuf::from("/tmp/a.wav"),
            PathBuf::from("/tmp/b.wav"),
            PathBuf::from("/tmp/c.wav"),
        ]
    );
    assert_eq!(engine.max_concurrent(), 1);

    daemon.shutdown().await;
}

#[tokio::test]
async fn simultaneous_connections_are_serialized() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(100)));
    let daemon = start_ready(&dir, &engine).await;

    // Both connections are open before either is answered
    let mut x = UnixStream::connect(daemon.socket_path()).await.unwrap();
    let mut y = UnixStream::connect(daemon.socket_path()).await.unwrap();
    x.write_all(b"/tmp/x.wav\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    y.write_all(b"/tmp/y.wav\n").await.unwrap();

    let (mut x_reply, mut y_reply) = (String::new(), String::new());
    let (x_read, y_read) = tokio::join!(x.read_to_string(&mut x_reply), y.read_to_string(&mut y_reply));
    x_read.unwrap();
    y_read.unwrap();
    assert_eq!(x_reply, "scripted transcription\n");
    assert_eq!(y_reply, "scripted transcription\n");

    let invocations = engine.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].path, PathBuf::from("/tmp/x.wav"));
    assert_eq!(invocations[1].path, PathBuf::from("/tmp/y.wav"));
    assert!(invocations[0].finished <= invocations[1].started);

    daemon.shutdown().await;
}

#[tokio::test]
async fn health_is_answered_while_a_job_runs() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(400)));
    let daemon = start_ready(&dir, &engine).await;

    let slow = spawn_exchange(daemon.socket_path(), "/tmp/long.wav\n");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let probe = tokio::time::timeout(
        Duration::from_millis(200),
        exchange(daemon.socket_path(), "HEALTH\n"),
    )
    .await
    .expect("health probe blocked behind the running job");
    assert_eq!(probe, "OK\n");

    assert_eq!(slow.await.unwrap(), "scripted transcription\n");
    daemon.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_in_flight_and_queued_jobs() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(150)));
    let daemon = start_ready(&dir, &engine).await;
    let socket_path = daemon.socket_path().to_path_buf();
    let lifecycle = daemon.lifecycle();

    let in_flight = spawn_exchange(&socket_path, "/tmp/first.wav\n");
    tokio::time::sleep(Duration::from_millis(40)).await;
    let queued = spawn_exchange(&socket_path, "/tmp/second.wav\n");
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(
        daemon.shutdown().await,
        DrainOutcome::Completed { processed: 2 }
    );
    assert_eq!(in_flight.await.unwrap(), "scripted transcription\n");
    assert_eq!(queued.await.unwrap(), "scripted transcription\n");

    assert_eq!(lifecycle.current(), LifecycleState::Stopped);
    assert!(!socket_path.exists());
    assert!(UnixStream::connect(&socket_path).await.is_err());
}

#[tokio::test]
async fn grace_expiry_abandons_the_running_job() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(600)));
    let mut daemon = Daemon::new(server_config(&dir, Duration::from_millis(100)), engine.clone())
        .start()
        .await
        .unwrap();
    daemon.wait_until_ready().await.unwrap();
    let socket_path = daemon.socket_path().to_path_buf();

    let client_socket = socket_path.clone();
    let abandoned = tokio::spawn(async move {
        client::transcribe(&client_socket, Path::new("/tmp/endless.wav")).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(daemon.shutdown().await, DrainOutcome::Abandoned);

    // Closed connection, not an error line
    match abandoned.await.unwrap() {
        Err(TranscriberError::IpcConnection { message }) => {
            assert!(message.contains("without a reply"), "{}", message);
        }
        other => panic!("Expected closed connection, got {:?}", other),
    }
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, Duration::from_secs(1));
    std::fs::write(&config.socket_path, b"left over from a crash").unwrap();

    let engine = Arc::new(ScriptedEngine::new("test"));
    let mut daemon = Daemon::new(config.clone(), engine).start().await.unwrap();
    daemon.wait_until_ready().await.unwrap();

    assert_eq!(exchange(&config.socket_path, "HEALTH\n").await, "OK\n");
    daemon.shutdown().await;
}

#[tokio::test]
async fn second_instance_is_refused_and_first_keeps_serving() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new("first"));
    let daemon = start_ready(&dir, &engine).await;
    let inode = std::fs::metadata(daemon.socket_path()).unwrap().ino();

    let second = Daemon::new(
        server_config(&dir, Duration::from_secs(2)),
        Arc::new(ScriptedEngine::new("second")),
    )
    .start()
    .await;
    match second {
        Err(TranscriberError::SingletonConflict { pid, .. }) => {
            assert_eq!(pid, std::process::id());
        }
        Err(other) => panic!("Expected SingletonConflict, got {:?}", other),
        Ok(_) => panic!("Second instance started"),
    }

    assert_eq!(std::fs::metadata(daemon.socket_path()).unwrap().ino(), inode);
    assert_eq!(exchange(daemon.socket_path(), "HEALTH\n").await, "OK\n");

    daemon.shutdown().await;
}

#[tokio::test]
async fn second_instance_on_another_socket_is_refused() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new("first"));
    let daemon = start_ready(&dir, &engine).await;

    // Same service, different socket
    let other = ServerConfig {
        socket_path: dir.path().join("elsewhere.sock"),
        ..server_config(&dir, Duration::from_secs(2))
    };
    let second_engine = Arc::new(ScriptedEngine::new("second"));
    let second = Daemon::new(other.clone(), second_engine.clone()).start().await;

    assert!(
        matches!(second, Err(TranscriberError::SingletonConflict { .. })),
        "second service instance started alongside the first"
    );
    assert!(!other.socket_path.exists());
    assert_eq!(second_engine.load_calls(), 0);
    assert_eq!(exchange(daemon.socket_path(), "HEALTH\n").await, "OK\n");

    daemon.shutdown().await;
}

#[tokio::test]
async fn engine_load_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, Duration::from_secs(1));
    let socket_path = config.socket_path.clone();
    let engine = Arc::new(
        ScriptedEngine::new("broken")
            .with_load_delay(Duration::from_millis(100))
            .with_load_failure("model file is corrupt"),
    );

    let probe_socket = socket_path.clone();
    let prober = tokio::spawn(async move {
        // Never OK, only LOADING or nothing at all
        let mut replies = Vec::new();
        for _ in 0..10 {
            if let Ok(reply) = client::health(&probe_socket).await {
                replies.push(reply);
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        replies
    });

    match run_daemon(config, engine, std::future::pending()).await {
        Err(TranscriberError::Startup { message }) => {
            assert!(message.contains("model file is corrupt"), "{}", message);
        }
        other => panic!("Expected Startup error, got {:?}", other),
    }
    assert!(!socket_path.exists());

    let replies = prober.await.unwrap();
    assert!(replies.iter().all(|r| *r == Response::Loading), "{:?}", replies);
}

#[tokio::test]
async fn bounded_queue_rejects_overflow() {
    let dir = TempDir::new().unwrap();
    let engine =
        Arc::new(ScriptedEngine::new("test").with_transcribe_delay(Duration::from_millis(200)));
    let config = ServerConfig {
        max_pending_jobs: Some(1),
        ..server_config(&dir, Duration::from_secs(2))
    };
    let mut daemon = Daemon::new(config, engine.clone()).start().await.unwrap();
    daemon.wait_until_ready().await.unwrap();

    // One running, one waiting, the third has no room
    let running = spawn_exchange(daemon.socket_path(), "/tmp/1.wav\n");
    tokio::time::sleep(Duration::from_millis(40)).await;
    let waiting = spawn_exchange(daemon.socket_path(), "/tmp/2.wav\n");
    tokio::time::sleep(Duration::from_millis(40)).await;

    let rejected = exchange(daemon.socket_path(), "/tmp/3.wav\n").await;
    assert!(rejected.starts_with("ERROR: Server busy"), "{}", rejected);

    assert_eq!(running.await.unwrap(), "scripted transcription\n");
    assert_eq!(waiting.await.unwrap(), "scripted transcription\n");
    assert_eq!(engine.invocations().len(), 2);

    daemon.shutdown().await;
}
