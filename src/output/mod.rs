pub mod table;

pub use table::*;

/// How list commands render their results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Pretty-printed JSON for `--json` output.
pub fn to_json<T: serde::Serialize>(value: &T) -> crate::error::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
