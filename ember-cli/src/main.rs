//! Ember CLI: run and inspect compiled modules.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode error
//! - 2: Invalid command line
//! - 3: Runtime fault

mod commands;
mod host;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ember", version, about = "Run and inspect Ember bytecode modules")]
struct Cli {
    /// Log at debug level (overridden by EMBER_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load each file as an instance and schedule them until idle.
    Run(commands::RunArgs),
    /// Print a module's header, tables and instruction listing.
    Inspect {
        /// Module file.
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Command::Run(args) => commands::run(args),
        Command::Inspect { file } => commands::inspect(file),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
