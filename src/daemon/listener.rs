//! IPC listener for daemon communication.
//!
//! This module provides the Unix domain socket listener that the daemon uses
//! to accept adapter connections.
//!
//! ## Security
//!
//! The socket file is created with mode 0600 (owner only); same-user local
//! processes are trusted, everything else is kept out at the filesystem
//! boundary. The socket file is automatically cleaned up when the listener
//! is dropped.
//!
//! ## Usage
//!
//! ```ignore
//! use bellhop::daemon::listener::IpcListener;
//!
//! let listener = IpcListener::bind(socket_path).await?;
//! loop {
//!     let conn = listener.accept().await?;
//!     // ... split and serve the connection ...
//! }
//! ```

use crate::daemon::protocol::{LineReader, Request, Response, decode_request, write_response};
use crate::error::{BellhopError, Result};

use std::path::{Path, PathBuf};
use tokio::net::{
    UnixListener, UnixStream,
    unix::{OwnedReadHalf, OwnedWriteHalf},
};

/// Unix socket listener accepting IPC connections from adapters.
pub struct IpcListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcListener {
    /// Bind to a Unix domain socket at the given path.
    ///
    /// This will:
    /// 1. Create the parent directory if it doesn't exist
    /// 2. Remove any existing socket file at the path
    /// 3. Bind to the socket
    /// 4. Set socket permissions to 0600 (owner only)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent directory cannot be created
    /// - The existing socket file cannot be removed
    /// - The socket cannot be bound
    /// - Permissions cannot be set
    pub async fn bind(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Remove existing socket file if present (stale from previous run)
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;

        // Owner-only: the socket is the trust boundary
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept a new incoming connection.
    ///
    /// This method blocks until a new adapter connects to the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting the connection fails.
    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(IpcConnection::new(stream))
    }

    /// Get the path to the socket file.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        // Clean up socket file on shutdown
        // Ignore errors since we're in drop
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// One adapter connection over the Unix socket.
///
/// The stream is split on construction: reads go through a capped
/// [`LineReader`], writes emit newline-terminated responses. Connections that
/// need concurrent reading and writing (the daemon's serve loop) take the
/// halves apart with [`IpcConnection::into_split`].
pub struct IpcConnection {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IpcConnection {
    /// Create a new connection from a Unix stream.
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: LineReader::new(read_half),
            writer: write_half,
        }
    }

    /// Receive the next request from the adapter. `Ok(None)` on clean EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, if the peer exceeds the line cap,
    /// or if the line is not a decodable request (the error message carries
    /// the salvaged detail).
    pub async fn recv_request(&mut self) -> Result<Option<Request>> {
        let Some(line) = self.reader.next_line().await? else {
            return Ok(None);
        };
        let request = decode_request(&line)
            .map_err(|e| BellhopError::DaemonProtocol(format!("{} ({})", e.message, e.code)))?;
        Ok(Some(request))
    }

    /// Send a response line to the adapter.
    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        write_response(&mut self.writer, response).await?;
        Ok(())
    }

    /// Take the connection apart for concurrent reading and writing.
    pub fn into_split(self) -> (LineReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}
