//! Send a chat message or create a topic through the daemon.

use crate::daemon::ensure_daemon;
use crate::error::Result;

/// Send a message to the chat channel, optionally into a thread
pub async fn send(text: &str, thread_id: Option<&str>) -> Result<()> {
    let client = ensure_daemon().await?;
    client.send_message(text, thread_id).await?;
    println!("Message sent.");
    Ok(())
}

/// Create a chat topic and print its thread handle
pub async fn topic(name: &str) -> Result<()> {
    let client = ensure_daemon().await?;
    let thread_id = client.create_topic(name).await?;
    println!("{}", thread_id);
    Ok(())
}
