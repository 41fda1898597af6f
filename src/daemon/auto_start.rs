//! Auto-start functionality for the bellhop daemon.
//!
//! This module provides utilities to ensure the daemon is running when an
//! adapter needs it. It handles automatic daemon startup with backoff retry
//! logic.

use std::process::Command;
use std::time::Duration;
use tokio::time::sleep;

use crate::daemon::client::DaemonClient;
use crate::error::{BellhopError, Result};
use crate::services::global_config as global_config_service;

/// Ensure the daemon is running, starting it if necessary.
///
/// This function first attempts to connect to an already-running daemon.
/// If the connection fails, it spawns a new daemon process and retries
/// the connection with increasing delays.
///
/// # Returns
///
/// Returns a connected `DaemonClient` on success.
///
/// # Errors
///
/// Returns `DaemonConnection` error if:
/// - The daemon binary is not found
/// - The daemon fails to start
/// - All connection retry attempts fail
///
/// # Example
///
/// ```ignore
/// use bellhop::daemon::ensure_daemon;
///
/// let client = ensure_daemon().await?;
/// let status = client.ping().await?;
/// println!("Connected to daemon version: {}", status.version);
/// ```
pub async fn ensure_daemon() -> Result<DaemonClient> {
    // Try to connect first - daemon may already be running
    if let Ok(client) = DaemonClient::connect().await {
        return Ok(client);
    }

    // Daemon not running, spawn it
    spawn_daemon()?;

    // Retry with increasing delays: 50ms, 100ms, 150ms, ...
    for attempt in 0..10 {
        let delay = Duration::from_millis(50 * (attempt + 1));
        sleep(delay).await;

        if let Ok(client) = DaemonClient::connect().await {
            return Ok(client);
        }
    }

    let runtime_dir = global_config_service::scope_runtime_dir()?;
    Err(BellhopError::DaemonConnection(format!(
        "Failed to start daemon. Check the daemon log in {:?} for details.",
        runtime_dir
    )))
}

/// Spawn the daemon process in the background.
///
/// The daemon binary (`bellhopd`) should be located next to the `bellhop`
/// binary. This spawns the daemon with stdin/stdout/stderr redirected to
/// null - the daemon sets up its own logging in the scope runtime directory.
/// The child inherits this process's environment, so `BELLHOP_HOME` and
/// `BELLHOP_SCOPE` resolve to the same runtime scope the adapter computed.
fn spawn_daemon() -> Result<()> {
    use std::process::Stdio;

    // Find the bellhopd binary - it should be next to the bellhop binary
    let current_exe = std::env::current_exe()?;
    let daemon_path = current_exe.with_file_name("bellhopd");

    if !daemon_path.exists() {
        return Err(BellhopError::DaemonConnection(format!(
            "Daemon binary not found at {:?}",
            daemon_path
        )));
    }

    // Ensure the scope runtime directory exists for socket/pid/log files
    global_config_service::ensure_scope_runtime_dir()?;

    // Spawn with stdin/stdout/stderr redirected to null
    // The daemon will set up its own logging
    Command::new(&daemon_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(())
}

/// Check if the daemon is currently running.
///
/// This is a convenience function that attempts to connect to the daemon
/// and returns true if the connection succeeds.
pub async fn is_daemon_running() -> bool {
    DaemonClient::connect().await.is_ok()
}

/// Get the daemon PID if running.
///
/// Reads the PID from the daemon's PID file in the scope runtime directory.
/// Returns `None` if the PID file doesn't exist or cannot be parsed.
///
/// Note: This does not verify if the process with that PID is still running.
/// Use `is_daemon_running()` for a connection-based check.
pub fn daemon_pid() -> Option<u32> {
    let pid_path = global_config_service::pid_path().ok()?;
    let pid_str = std::fs::read_to_string(&pid_path).ok()?;
    pid_str.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_pid_tolerates_missing_file() {
        // The PID file may or may not exist on this machine; either way the
        // lookup must not panic
        let _ = daemon_pid();
    }

    #[tokio::test]
    async fn test_is_daemon_running_returns_without_panicking() {
        // Whether a daemon is up depends on the machine; the probe itself
        // must never panic
        let _ = is_daemon_running().await;
    }
}
