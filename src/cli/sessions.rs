//! Session listing. Sessions live only in daemon memory, so a daemon that
//! is not running has none to list.

use crate::daemon::DaemonClient;
use crate::daemon::auto_start::is_daemon_running;
use crate::error::Result;
use crate::output::{self, OutputFormat};

/// List connected sessions
pub async fn list(format: OutputFormat) -> Result<()> {
    if !is_daemon_running().await {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Table => println!("Daemon is not running; no sessions connected."),
        }
        return Ok(());
    }

    let client = DaemonClient::connect().await?;
    let sessions = client.list_sessions().await?;

    match format {
        OutputFormat::Json => println!("{}", output::to_json(&sessions)?),
        OutputFormat::Table => print!("{}", output::format_sessions(&sessions)),
    }
    Ok(())
}
