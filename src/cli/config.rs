//! Configuration commands for the global config file.

use crate::cli::args::ConfigAction;
use crate::error::{BellhopError, Result};
use crate::services::global_config as global_config_service;

/// Handle config commands
pub async fn config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show(),
        ConfigAction::Path => path(),
        ConfigAction::Edit => edit(),
    }
}

/// Print the resolved configuration as TOML
fn show() -> Result<()> {
    let config = global_config_service::load()?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| BellhopError::GlobalConfig(format!("Failed to serialize config: {}", e)))?;
    print!("{}", rendered);
    Ok(())
}

/// Print the config file path
fn path() -> Result<()> {
    println!("{}", global_config_service::config_path()?.display());
    Ok(())
}

/// Open the config file in the user's editor
fn edit() -> Result<()> {
    global_config_service::edit_config()?;
    println!("Config saved.");
    Ok(())
}
