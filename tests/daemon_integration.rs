//! Integration tests for the bellhop daemon.
//!
//! These tests verify end-to-end behavior of the daemon, client, and the
//! persisted question store working together. Each test runs in isolation
//! with its own temporary home and scope, and its own daemon instance.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::sleep;

use bellhop::daemon::DaemonClient;
use bellhop::daemon::protocol::AskQuestionParams;
use bellhop::services::global_config as global_config_service;

/// Test helper to start a test daemon in isolation.
///
/// Each TestDaemon instance:
/// - Creates a temporary directory holding BELLHOP_HOME and BELLHOP_SCOPE
/// - Starts the daemon process with that environment
/// - Provides clients for interacting with the daemon
/// - Cleans up everything on drop
struct TestDaemon {
    /// Owns the home and scope directories for the daemon's lifetime
    _temp_dir: TempDir,
    home: PathBuf,
    scope: PathBuf,
    /// The daemon process handle
    process: Option<Child>,
    /// Path to the socket for this instance
    socket_path: PathBuf,
}

impl TestDaemon {
    /// Start a new test daemon instance.
    ///
    /// This creates a temporary directory, sets up the environment, and
    /// starts the daemon process. It waits for the daemon to be ready
    /// before returning.
    async fn start() -> Result<Self, String> {
        let temp_dir = TempDir::new().map_err(|e| format!("Failed to create temp dir: {}", e))?;

        let home = temp_dir.path().join("bellhop-home");
        let scope = temp_dir.path().join("scope");
        std::fs::create_dir_all(&home).map_err(|e| format!("Failed to create home: {}", e))?;
        std::fs::create_dir_all(&scope).map_err(|e| format!("Failed to create scope: {}", e))?;

        // The daemon canonicalizes the scope root before hashing it, so the
        // test has to hash the same spelling to land on the same socket.
        let scope = std::fs::canonicalize(&scope).unwrap_or(scope);
        let runtime_dir = home
            .join("daemon")
            .join(global_config_service::scope_dir_name(&scope));
        let socket_path = runtime_dir.join("bellhopd.sock");

        let process = spawn_daemon(&home, &scope)?;

        let mut instance = Self {
            _temp_dir: temp_dir,
            home,
            scope,
            process: Some(process),
            socket_path,
        };
        instance.wait_ready().await?;
        Ok(instance)
    }

    /// Wait for the daemon to accept connections (up to 5 seconds).
    async fn wait_ready(&mut self) -> Result<(), String> {
        for _ in 0..50 {
            sleep(Duration::from_millis(100)).await;
            if self.try_connect().await.is_ok() {
                return Ok(());
            }
            // Check if process exited prematurely
            if let Some(ref mut proc) = self.process {
                if let Ok(Some(status)) = proc.try_wait() {
                    return Err(format!(
                        "Daemon exited prematurely with status: {:?}\nstderr: {}",
                        status,
                        read_stderr(proc)
                    ));
                }
            }
        }
        let stderr = self
            .process
            .as_mut()
            .map(read_stderr)
            .unwrap_or_default();
        Err(format!(
            "Daemon failed to start within 5 seconds\nSocket path: {:?}\nstderr: {}",
            self.socket_path, stderr
        ))
    }

    /// Try to connect to the daemon.
    async fn try_connect(&self) -> Result<DaemonClient, String> {
        if !self.socket_path.exists() {
            return Err("Socket does not exist yet".to_string());
        }
        DaemonClient::connect_to(&self.socket_path)
            .await
            .map_err(|e| format!("Connect failed: {}", e))
    }

    /// Get a connected client to this daemon.
    async fn client(&self) -> Result<DaemonClient, String> {
        self.try_connect().await
    }

    /// Stop the daemon gracefully, falling back to kill.
    async fn stop(&mut self) -> Result<(), String> {
        if let Ok(client) = self.try_connect().await {
            let _ = client.shutdown().await;
            for _ in 0..30 {
                sleep(Duration::from_millis(100)).await;
                if let Some(ref mut proc) = self.process {
                    if proc.try_wait().ok().flatten().is_some() {
                        self.process = None;
                        return Ok(());
                    }
                }
            }
        }

        if let Some(ref mut proc) = self.process {
            let _ = proc.kill();
            let _ = proc.wait();
        }
        self.process = None;
        Ok(())
    }

    /// Stop the daemon and start a fresh process on the same home and
    /// scope, so persisted state carries across.
    async fn restart(&mut self) -> Result<(), String> {
        self.stop().await?;
        self.process = Some(spawn_daemon(&self.home, &self.scope)?);
        self.wait_ready().await
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        // Ensure process is killed when test ends
        if let Some(ref mut proc) = self.process {
            let _ = proc.kill();
            let _ = proc.wait();
        }
    }
}

fn spawn_daemon(home: &Path, scope: &Path) -> Result<Child, String> {
    let daemon_path = find_daemon_binary()?;
    Command::new(&daemon_path)
        .env("BELLHOP_HOME", home)
        .env("BELLHOP_SCOPE", scope)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn daemon: {}", e))
}

fn read_stderr(proc: &mut Child) -> String {
    use std::io::Read;
    let mut s = String::new();
    if let Some(mut err) = proc.stderr.take() {
        let _ = err.read_to_string(&mut s);
    }
    s
}

/// Find the bellhopd binary in the target directory.
fn find_daemon_binary() -> Result<PathBuf, String> {
    // Try debug build first, then release
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let target_dir = PathBuf::from(manifest_dir).join("target");

    let debug_path = target_dir.join("debug").join("bellhopd");
    if debug_path.exists() {
        return Ok(debug_path);
    }

    let release_path = target_dir.join("release").join("bellhopd");
    if release_path.exists() {
        return Ok(release_path);
    }

    // When running from cargo test the binary sits next to the test binary
    if let Ok(exe) = std::env::current_exe() {
        for dir in exe.ancestors().skip(1).take(3) {
            let sibling_path = dir.join("bellhopd");
            if sibling_path.exists() {
                return Ok(sibling_path);
            }
        }
    }

    Err(format!(
        "bellhopd binary not found. Build it first with 'cargo build'. Searched in: {:?}",
        target_dir
    ))
}

fn ask_params(session_id: &str, title: &str) -> AskQuestionParams {
    AskQuestionParams {
        session_id: session_id.to_string(),
        title: title.to_string(),
        body: format!("{}?", title),
        context: None,
        timeout_minutes: Some(60),
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Test that the daemon responds to ping requests.
#[tokio::test]
async fn test_daemon_ping() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let client = daemon.client().await.expect("Failed to connect to daemon");
    let status = client.ping().await.expect("Ping failed");

    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(status.sessions, 0);
    assert_eq!(status.pending_questions, 0);
}

/// Two sessions of one project get sequential labels.
#[tokio::test]
async fn test_sessions_get_sequential_labels() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let first = daemon.client().await.expect("connect 1");
    let second = daemon.client().await.expect("connect 2");

    let a = first
        .register_session("/home/user/demo")
        .await
        .expect("register 1");
    let b = second
        .register_session("/home/user/demo")
        .await
        .expect("register 2");

    assert_eq!(a.label, "demo/1");
    assert_eq!(b.label, "demo/2");

    let sessions = first.list_sessions().await.expect("list");
    assert_eq!(sessions.len(), 2);

    // Dropping the second connection frees its suffix for reuse
    drop(second);
    sleep(Duration::from_millis(200)).await;

    let third = daemon.client().await.expect("connect 3");
    let c = third
        .register_session("/home/user/demo")
        .await
        .expect("register 3");
    assert_eq!(c.label, "demo/2");
}

/// An answer arriving mid-wait resolves the long-poll promptly, and
/// collecting the outcome removes the question.
#[tokio::test]
async fn test_ask_answer_roundtrip() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let asker = daemon.client().await.expect("connect asker");
    let registered = asker
        .register_session("/home/user/demo")
        .await
        .expect("register");

    let question = asker
        .ask_blocking_question(ask_params(&registered.session_id, "Pick a port"))
        .await
        .expect("ask");
    assert_eq!(question.status, "pending");

    // Answer from a second connection a moment later
    let answerer = daemon.client().await.expect("connect answerer");
    let question_id = question.id.clone();
    let answer_task = tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        answerer
            .mark_question_answered(&question_id, "8080")
            .await
            .expect("answer")
    });

    let started = Instant::now();
    let result = asker
        .check_question_answers(&registered.session_id, vec![question.id.clone()], Some(60))
        .await
        .expect("check");
    let elapsed = started.elapsed();

    assert_eq!(result.answers.len(), 1);
    assert_eq!(result.answers[0].answer.as_deref(), Some("8080"));
    assert!(result.pending.is_empty());
    assert!(
        elapsed >= Duration::from_millis(250) && elapsed < Duration::from_secs(10),
        "long-poll should resolve promptly, took {:?}",
        elapsed
    );

    let resolve = answer_task.await.expect("answer task");
    assert!(resolve.resolved);

    // Collected: a second check finds the question in neither list
    let again = asker
        .check_question_answers(&registered.session_id, vec![question.id.clone()], Some(0))
        .await
        .expect("second check");
    assert!(again.answers.is_empty());
    assert!(again.pending.is_empty());
}

/// A second answer is an idempotent no-op reported in-band.
#[tokio::test]
async fn test_double_answer_reports_already_resolved() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let client = daemon.client().await.expect("connect");
    let registered = client
        .register_session("/home/user/demo")
        .await
        .expect("register");
    let question = client
        .ask_blocking_question(ask_params(&registered.session_id, "Deploy"))
        .await
        .expect("ask");

    let first = client
        .mark_question_answered(&question.id, "yes")
        .await
        .expect("first answer");
    assert!(first.resolved);

    let second = client
        .mark_question_answered(&question.id, "no")
        .await
        .expect("second answer");
    assert!(!second.resolved);
    assert_eq!(second.status, "answered");
}

/// A multi-megabyte line without a newline closes only that connection.
#[tokio::test]
async fn test_oversized_line_closes_only_offending_connection() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let healthy = daemon.client().await.expect("connect healthy");

    let mut offender = UnixStream::connect(&daemon.socket_path)
        .await
        .expect("connect offender");

    // 3 MiB with no newline blows the 2 MiB line cap
    let blob = vec![b'a'; 3 * 1024 * 1024];
    // The daemon may close mid-write; either the write fails or the
    // subsequent read returns EOF
    let write_result = offender.write_all(&blob).await;
    if write_result.is_ok() {
        let _ = offender.flush().await;
        let mut buf = [0u8; 64];
        let closed = match offender.read(&mut buf).await {
            Ok(0) => true,
            Ok(_) => false,
            Err(_) => true,
        };
        assert!(closed, "daemon should close the offending connection");
    }

    // Other connections are unaffected
    let status = healthy.ping().await.expect("healthy ping");
    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
}

/// A pending question survives a daemon restart with its creation time
/// (and therefore its deadline) unchanged.
#[tokio::test]
async fn test_restart_preserves_pending_question() {
    let mut daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let client = daemon.client().await.expect("connect");
    let registered = client
        .register_session("/home/user/demo")
        .await
        .expect("register");
    let question = client
        .ask_blocking_question(ask_params(&registered.session_id, "Survive restart"))
        .await
        .expect("ask");
    drop(client);

    daemon.restart().await.expect("restart");

    let client = daemon.client().await.expect("reconnect");
    let questions = client.list_questions(None).await.expect("list");
    assert_eq!(questions.len(), 1);
    let recovered = &questions[0];
    assert_eq!(recovered.id, question.id);
    assert_eq!(recovered.status, "pending");
    assert_eq!(recovered.created_at, question.created_at);
    assert_eq!(recovered.timeout_minutes, question.timeout_minutes);

    // The restarted session can still collect its earlier question by id
    let answerer = daemon.client().await.expect("connect answerer");
    answerer
        .mark_question_answered(&question.id, "made it")
        .await
        .expect("answer");

    let fresh = client
        .register_session("/home/user/demo")
        .await
        .expect("re-register");
    let result = client
        .check_question_answers(&fresh.session_id, vec![question.id.clone()], Some(5))
        .await
        .expect("collect");
    assert_eq!(result.answers.len(), 1);
    assert_eq!(result.answers[0].answer.as_deref(), Some("made it"));
}

/// Terminal rows that were never collected are pruned at startup.
#[tokio::test]
async fn test_restart_prunes_resolved_questions() {
    let mut daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let client = daemon.client().await.expect("connect");
    let registered = client
        .register_session("/home/user/demo")
        .await
        .expect("register");

    for title in ["First", "Second"] {
        let question = client
            .ask_blocking_question(ask_params(&registered.session_id, title))
            .await
            .expect("ask");
        client
            .mark_question_answered(&question.id, "done")
            .await
            .expect("answer");
        // Deliberately never collected
    }
    drop(client);

    daemon.restart().await.expect("restart");

    let client = daemon.client().await.expect("reconnect");
    let questions = client.list_questions(None).await.expect("list");
    assert!(
        questions.is_empty(),
        "answered rows should be pruned at startup, found {:?}",
        questions
    );
}

/// Test daemon shutdown via IPC.
#[tokio::test]
async fn test_daemon_shutdown() {
    let mut daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let client = daemon.client().await.expect("Failed to connect to daemon");
    client.ping().await.expect("Initial ping failed");

    client.shutdown().await.expect("Shutdown request failed");

    // The process should exit and remove its socket
    let mut exited = false;
    for _ in 0..30 {
        sleep(Duration::from_millis(100)).await;
        if let Some(ref mut proc) = daemon.process {
            if proc.try_wait().ok().flatten().is_some() {
                exited = true;
                break;
            }
        }
    }
    assert!(exited, "daemon should exit after shutdown request");
    assert!(
        !daemon.socket_path.exists(),
        "socket should be removed on shutdown"
    );
    daemon.process = None;
}

/// Test concurrent connections to the daemon.
#[tokio::test]
async fn test_daemon_concurrent_connections() {
    let daemon = match TestDaemon::start().await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let socket_path = daemon.socket_path.clone();
    let mut handles = Vec::new();

    for _ in 0..5 {
        let path = socket_path.clone();
        handles.push(tokio::spawn(async move {
            let client = DaemonClient::connect_to(&path).await?;
            client.ping().await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.expect("Task panicked");
        assert!(
            result.is_ok(),
            "Concurrent ping {} failed: {:?}",
            i,
            result.err()
        );
    }
}
