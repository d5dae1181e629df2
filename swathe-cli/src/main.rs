//! Swathe CLI - field simulator and configuration tool.
//!
//! Runs the section control engine against a scripted tractor and manages
//! the INI configuration file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use swathe::logging::{init_logging, LoggingConfig, DEFAULT_LOG_LEVEL};

mod commands;
mod error;
mod sim;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

/// Swathe - automatic section control for GPS guidance
#[derive(Debug, Parser)]
#[command(name = "swathe")]
#[command(about = "Automatic section control for agricultural GPS guidance", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive a simulated field with the section controller
    Simulate(SimulateArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = LoggingConfig::default().with_level(cli.log_level);
    if let Some(path) = cli.log_file {
        logging = logging.with_file(path);
    }
    let _guard = init_logging(&logging)?;

    tracing::debug!(version = swathe::VERSION, "swathe starting");

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { command } => commands::config::run(command),
    }
}
