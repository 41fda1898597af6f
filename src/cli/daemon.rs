//! Daemon CLI commands for managing the bellhop daemon process.
//!
//! The daemon is a long-running background process that owns the chat
//! connection and all session/question state for a scope. These commands
//! allow users to check its status, start/stop it manually, and view its
//! logs.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use crate::cli::args::DaemonCommand;
use crate::daemon::DaemonClient;
use crate::daemon::auto_start::{daemon_pid, is_daemon_running};
use crate::error::Result;
use crate::services::global_config as global_config_service;

/// Handle daemon commands
pub async fn daemon(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Status => daemon_status().await,
        DaemonCommand::Start => daemon_start().await,
        DaemonCommand::Stop => daemon_stop().await,
        DaemonCommand::Restart => daemon_restart().await,
        DaemonCommand::Logs { follow, lines } => daemon_logs(follow, lines).await,
    }
}

/// Show daemon status
async fn daemon_status() -> Result<()> {
    if is_daemon_running().await {
        let client = DaemonClient::connect().await?;
        let status = client.ping().await?;

        let pid = daemon_pid().unwrap_or(0);
        println!("Daemon status: running");
        println!("  PID: {}", pid);
        println!("  Version: {}", status.version);
        println!("  Uptime: {}s", status.uptime_secs);
        println!("  Sessions: {}", status.sessions);
        println!("  Pending questions: {}", status.pending_questions);
        let socket_path = global_config_service::socket_path()?;
        println!("  Socket: {}", socket_path.display());
    } else {
        println!("Daemon status: not running");
        println!("  Run 'bellhop daemon start' or any ask command to start it.");
    }

    Ok(())
}

/// Start the daemon manually
async fn daemon_start() -> Result<()> {
    if is_daemon_running().await {
        println!("Daemon is already running.");
        return Ok(());
    }

    // Use ensure_daemon which handles spawning and waiting for connection
    match crate::daemon::ensure_daemon().await {
        Ok(client) => {
            println!("Daemon started successfully.");
            if let Ok(status) = client.ping().await {
                println!("  Version: {}", status.version);
            }
            if let Some(pid) = daemon_pid() {
                println!("  PID: {}", pid);
            }
            Ok(())
        }
        Err(e) => {
            println!("Failed to start daemon: {}", e);
            let runtime_dir = global_config_service::scope_runtime_dir()?;
            println!("Check logs under: {}", runtime_dir.display());
            Err(e)
        }
    }
}

/// Stop the daemon
async fn daemon_stop() -> Result<()> {
    if !is_daemon_running().await {
        println!("Daemon is not running.");
        return Ok(());
    }

    let client = DaemonClient::connect().await?;
    client.shutdown().await?;

    // Wait for shutdown
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !is_daemon_running().await {
            println!("Daemon stopped.");
            return Ok(());
        }
    }

    println!("Warning: Daemon may still be shutting down.");
    Ok(())
}

/// Restart the daemon
async fn daemon_restart() -> Result<()> {
    if is_daemon_running().await {
        println!("Stopping daemon...");
        daemon_stop().await?;
        // Give a bit more time for full shutdown
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    println!("Starting daemon...");
    daemon_start().await
}

/// Show daemon logs
async fn daemon_logs(follow: bool, lines: usize) -> Result<()> {
    let Some(log_path) = global_config_service::latest_log_path()? else {
        let runtime_dir = global_config_service::scope_runtime_dir()?;
        println!("No daemon logs found under: {}", runtime_dir.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    };

    if follow {
        follow_log(&log_path, lines).await
    } else {
        print_log_tail(&log_path, lines)
    }
}

/// Print the last N lines of a log file
fn print_log_tail(path: &Path, lines: usize) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }

    Ok(())
}

/// Follow a log file like tail -f
async fn follow_log(path: &Path, initial_lines: usize) -> Result<()> {
    // Print initial lines
    print_log_tail(path, initial_lines)?;

    // Open file for following
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::End(0))?;

    let mut reader = BufReader::new(file);
    let mut line = String::new();

    println!("--- Following log (Ctrl+C to stop) ---");

    loop {
        match reader.read_line(&mut line) {
            Ok(0) => {
                // No new data, wait a bit
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(_) => {
                print!("{}", line);
                line.clear();
            }
            Err(e) => {
                eprintln!("Error reading log: {}", e);
                break;
            }
        }

        // Check for shutdown signal via select
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(10)) => {
                // Continue reading
            }
        }
    }

    Ok(())
}
