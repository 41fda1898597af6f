//! Bellhop - blocking human-in-the-loop questions for agent sessions.
//!
//! One daemon per scope owns the chat connection and all session/question
//! state; thin per-session adapters talk to it over a Unix domain socket,
//! so any number of concurrent agent sessions can ask a human questions
//! through a single chat channel.

pub mod cli;
pub mod daemon;
pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod output;
pub mod services;

pub use error::{BellhopError, Result};
