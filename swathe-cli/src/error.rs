//! CLI error type.

use std::fmt;

use swathe::config::ConfigFileError;
use swathe::logging::LoggingError;
use swathe::sections::{ConfigError, SectionError};

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or unreadable configuration.
    Config(String),
    /// Configuration file failure.
    ConfigFile(ConfigFileError),
    /// Section control rejected an operation.
    Section(SectionError),
    /// Simulation could not run.
    Simulation(String),
    /// Logging setup failed.
    Logging(LoggingError),
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::ConfigFile(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration error: {}", e),
            CliError::Section(e) => write!(f, "Section control error: {}", e),
            CliError::Simulation(msg) => write!(f, "Simulation error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Section(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::Config(_) | CliError::Simulation(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(ConfigFileError::Section(e))
    }
}

impl From<SectionError> for CliError {
    fn from(e: SectionError) -> Self {
        CliError::Section(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
