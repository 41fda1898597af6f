//! Shared types for the bellhop daemon and adapter.
//!
//! These types cross the IPC boundary between `bellhopd` and its adapters and
//! can be used by any tool that needs to parse bellhop output.
//!
//! # Features
//!
//! - `sqlx`: Enables `sqlx::FromRow` derive for database integration.

pub mod config;
pub mod ids;
pub mod question;
pub mod session;

pub use config::*;
pub use ids::*;
pub use question::*;
pub use session::*;
