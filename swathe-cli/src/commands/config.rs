//! Configuration CLI commands.
//!
//! Provides `config show`, `config check`, `config init` and `config path`.

use std::path::PathBuf;

use clap::Subcommand;
use swathe::config::{config_file_path, ConfigFile};

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Config file to read instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    Check {
        /// File to validate
        file: PathBuf,
    },

    /// Write a configuration file with default values
    Init {
        /// Where to write (defaults to the standard location)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { config } => run_show(config),
        ConfigCommands::Check { file } => run_check(file),
        ConfigCommands::Init { path, force } => run_init(path, force),
        ConfigCommands::Path => run_path(),
    }
}

fn default_path() -> Result<PathBuf, CliError> {
    config_file_path()
        .ok_or_else(|| CliError::Config("Could not determine the configuration directory".into()))
}

/// Print the effective configuration and the derived section layout.
fn run_show(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(path.as_deref())?;
    print!("{}", config.to_ini_string());

    let sections = &config.sections;
    println!();
    println!("; Section layout (offset positive = left of centerline)");
    for (id, (width, offset)) in sections
        .section_widths()
        .iter()
        .zip(sections.section_offsets())
        .enumerate()
    {
        println!(";   {:>2}: width {:>5.2} m, offset {:>+7.3} m", id, width, offset);
    }
    println!(";   total width {:.2} m", sections.total_width());
    Ok(())
}

/// Validate a file, failing with the first problem found.
fn run_check(file: PathBuf) -> Result<(), CliError> {
    let config = ConfigFile::load_from(&file)?;
    println!(
        "{}: OK ({} sections, {:.2} m total width)",
        file.display(),
        config.sections.section_count(),
        config.sections.total_width()
    );
    Ok(())
}

fn run_init(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = match path {
        Some(path) => path,
        None => default_path()?,
    };
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", default_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_check() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");

        run_init(Some(path.clone()), false).unwrap();
        assert!(path.exists());
        run_check(path.clone()).unwrap();
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[sections]\ncount = 2\n").unwrap();

        let err = run_init(Some(path.clone()), false).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[sections]\ncount = 2\n"
        );

        run_init(Some(path), true).unwrap();
    }

    #[test]
    fn test_check_reports_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.ini");
        std::fs::write(&path, "[sections]\ncount = 40\n").unwrap();

        let err = run_check(path).unwrap_err();
        assert!(matches!(err, CliError::ConfigFile(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
