//! Daemon module: the IPC surface between session adapters and bellhopd.
//!
//! This module provides the protocol, services, and client types for
//! communicating between per-session adapters and the long-lived daemon
//! process that owns the chat connection and the question registry.
//!
//! ## Components
//!
//! - [`protocol`]: Request/Response types and newline-delimited JSON framing
//! - [`listener`]: Unix socket listener for accepting adapter connections
//! - [`registry`]: Live session registry with per-connection ownership
//! - [`questions`]: Question lifecycle (ask, answer, timeout, cancel, sweep)
//! - [`state`]: Shared daemon state handed to connection tasks
//! - [`client`]: DaemonClient with pipelined, id-correlated calls
//! - [`adapter`]: Session-scoped adapter with blocking ask and reconnection
//! - [`auto_start`]: Auto-start logic to ensure a daemon is running

pub mod adapter;
pub mod auto_start;
pub mod client;
pub mod listener;
pub mod protocol;
pub mod questions;
pub mod registry;
pub mod state;

pub use adapter::Adapter;
pub use auto_start::ensure_daemon;
pub use client::DaemonClient;
pub use listener::{IpcConnection, IpcListener};
pub use protocol::*;
