// Re-export all types from bellhop-types
pub use bellhop_types::*;
