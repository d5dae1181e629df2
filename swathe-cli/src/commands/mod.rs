//! CLI command implementations.

pub mod config;
pub mod simulate;

use std::path::Path;

use swathe::config::ConfigFile;

use crate::error::CliError;

/// Load an explicit config file, or the default one (defaults when absent).
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}
