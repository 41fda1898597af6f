//! Global configuration service for loading and saving user-level settings.
//!
//! Manages the config file at `~/.bellhop/config.toml` and the per-scope
//! daemon runtime directories under `~/.bellhop/daemon/`.

use crate::error::{BellhopError, Result};
use crate::models::GlobalConfig;
use bellhop_types::ids::normalize_slug;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory.
pub const HOME_ENV: &str = "BELLHOP_HOME";

/// Environment variable selecting the runtime scope root.
pub const SCOPE_ENV: &str = "BELLHOP_SCOPE";

/// File name prefix for the daily-rotated daemon log.
pub const LOG_FILE_PREFIX: &str = "daemon.log";

/// Longest slug component of a scope directory name. Socket paths have a
/// hard length ceiling on most platforms, so the human-readable part is
/// kept short and the digest does the disambiguation.
const SCOPE_SLUG_MAX_LEN: usize = 24;

/// Get the global bellhop config directory (~/.bellhop)
///
/// `$BELLHOP_HOME` overrides the default so tests and sandboxed installs can
/// relocate all state.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".bellhop"))
        .ok_or_else(|| BellhopError::GlobalConfig("Could not determine home directory".into()))
}

/// Get the path to the global config file (~/.bellhop/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the root of all per-scope daemon directories (~/.bellhop/daemon)
pub fn daemon_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("daemon"))
}

/// Resolve the runtime scope root.
///
/// `$BELLHOP_SCOPE` wins; otherwise the config directory itself acts as a
/// global scope. The path is canonicalized when possible so different
/// spellings of the same directory land on the same daemon.
pub fn scope_root() -> Result<PathBuf> {
    let raw = match std::env::var(SCOPE_ENV) {
        Ok(scope) if !scope.is_empty() => PathBuf::from(scope),
        _ => config_dir()?,
    };
    Ok(std::fs::canonicalize(&raw).unwrap_or(raw))
}

/// Short human-readable component of a scope directory name.
pub fn scope_slug(root: &Path) -> String {
    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    // char-based cut: slugs may contain non-ASCII alphanumerics
    let mut slug: String = normalize_slug(&base)
        .chars()
        .take(SCOPE_SLUG_MAX_LEN)
        .collect();
    if slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "scope".to_string()
    } else {
        slug
    }
}

/// First 12 hex chars of the SHA-256 of the scope root path.
pub fn scope_digest(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Directory name for a scope: `<slug>-<digest12>`.
///
/// The digest keys the directory to the exact scope root; the slug is only
/// there so humans can tell runtime directories apart.
pub fn scope_dir_name(root: &Path) -> String {
    format!("{}-{}", scope_slug(root), scope_digest(root))
}

/// Runtime directory for the current scope
/// (~/.bellhop/daemon/<slug>-<digest12>)
///
/// Holds the daemon socket, pid file, logs, and question store. Everything
/// a scope's daemon owns lives here and nowhere else.
pub fn scope_runtime_dir() -> Result<PathBuf> {
    Ok(daemon_dir()?.join(scope_dir_name(&scope_root()?)))
}

/// Create the scope runtime directory with owner-only permissions.
pub fn ensure_scope_runtime_dir() -> Result<PathBuf> {
    let dir = scope_runtime_dir()?;
    std::fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

/// Daemon socket path for the current scope
pub fn socket_path() -> Result<PathBuf> {
    Ok(scope_runtime_dir()?.join("bellhopd.sock"))
}

/// Daemon PID file path for the current scope
pub fn pid_path() -> Result<PathBuf> {
    Ok(scope_runtime_dir()?.join("bellhopd.pid"))
}

/// SQLite question store path for the current scope
pub fn db_path() -> Result<PathBuf> {
    Ok(scope_runtime_dir()?.join("questions.db"))
}

/// Newest daily-rotated daemon log for the current scope, if any exists.
///
/// Rotation appends a date suffix (`daemon.log.2026-08-21`), so the newest
/// file sorts last by name.
pub fn latest_log_path() -> Result<Option<PathBuf>> {
    let dir = scope_runtime_dir()?;
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    let mut logs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .collect();
    logs.sort();
    Ok(logs.pop())
}

/// Load the global configuration from ~/.bellhop/config.toml
/// Returns default config if file doesn't exist.
pub fn load() -> Result<GlobalConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    Ok(toml::from_str(&content)?)
}

/// Save the global configuration to ~/.bellhop/config.toml
pub fn save(config: &GlobalConfig) -> Result<()> {
    let path = config_path()?;

    // Ensure the directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| BellhopError::GlobalConfig(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(&path, content)?;
    Ok(())
}

/// Open the config file in the user's editor
pub fn edit_config() -> Result<()> {
    let path = config_path()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create default config file if it doesn't exist
    if !path.exists() {
        let default_config = GlobalConfig::default();
        save(&default_config)?;
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = std::process::Command::new(&editor).arg(&path).status()?;

    if !status.success() {
        return Err(BellhopError::GlobalConfig(format!(
            "Editor '{}' exited with non-zero status",
            editor
        )));
    }

    Ok(())
}
