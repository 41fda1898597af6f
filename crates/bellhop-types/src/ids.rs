//! ID generation and parsing utilities for bellhop entities.
//!
//! This module provides functions for generating question and session IDs and
//! for deriving/parsing the human-facing session labels ("myproj/2").

use rand::RngExt;
use std::fmt;

/// Base32 alphabet (Crockford-style, excludes I, L, O, U to avoid confusion)
const BASE32_ALPHABET: &[u8] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Longest project name kept in a session label before truncation.
const MAX_LABEL_PROJECT_LEN: usize = 24;

/// Error type for ID parsing operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Result type for ID parsing operations
pub type IdParseResult<T> = std::result::Result<T, IdParseError>;

/// Generate a random suffix using base32 encoding
pub fn generate_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE32_ALPHABET[rng.random_range(0..32)] as char)
        .collect()
}

/// Normalize a string to be used as a slug
/// - Lowercase
/// - Replace non-alphanumeric with hyphens
/// - Collapse multiple hyphens
/// - Trim leading/trailing hyphens
pub fn normalize_slug(s: &str) -> String {
    let slug: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();

    // Collapse multiple hyphens and trim
    let mut result = String::new();
    let mut prev_hyphen = true; // Start true to skip leading hyphens
    for c in slug.chars() {
        if c == '-' {
            if !prev_hyphen {
                result.push(c);
            }
            prev_hyphen = true;
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    // Trim trailing hyphen
    if result.ends_with('-') {
        result.pop();
    }

    result
}

/// Derive the short project name used in session labels from a project root
/// path. Takes the final path component, slugifies it, and truncates it.
/// Empty or unusable paths fall back to "session".
pub fn short_project_name(project_root: &str) -> String {
    let base = std::path::Path::new(project_root)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    // char-based cut: slugs may contain non-ASCII alphanumerics
    let mut slug: String = normalize_slug(&base)
        .chars()
        .take(MAX_LABEL_PROJECT_LEN)
        .collect();
    // Truncation can leave a trailing hyphen behind
    if slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug = "session".to_string();
    }
    slug
}

/// Format a session label from a project name and numeric suffix
/// Example: "myproj/2"
pub fn format_session_label(project: &str, suffix: u32) -> String {
    format!("{}/{}", project, suffix)
}

/// Parse a session label into its project name and numeric suffix
pub fn parse_session_label(label: &str) -> IdParseResult<(&str, u32)> {
    let pos = label
        .rfind('/')
        .ok_or_else(|| IdParseError::new(format!("Invalid session label format: {}", label)))?;

    let project = &label[..pos];
    let suffix = label[pos + 1..]
        .parse::<u32>()
        .map_err(|_| IdParseError::new(format!("Invalid suffix in session label: {}", label)))?;

    if project.is_empty() {
        return Err(IdParseError::new(format!(
            "Empty project in session label: {}",
            label
        )));
    }

    Ok((project, suffix))
}

/// Generate a session ID
/// Format: sess-<date>-<suffix>
/// Example: "sess-20260821-7f2c"
pub fn generate_session_id() -> String {
    let date = chrono::Utc::now().format("%Y%m%d");
    let suffix = generate_suffix(4);
    format!("sess-{}-{}", date, suffix)
}

/// Generate a question ID
/// Format: q-<suffix>
/// Example: "q-a3f8k2m1"
pub fn generate_question_id() -> String {
    let suffix = generate_suffix(8);
    format!("q-{}", suffix)
}
