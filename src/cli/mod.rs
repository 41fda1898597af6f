pub mod args;
pub mod ask;
pub mod config;
pub mod daemon;
pub mod questions;
pub mod send;
pub mod sessions;

pub use args::*;
