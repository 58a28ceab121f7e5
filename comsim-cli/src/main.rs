//! Comsim CLI - Command-line interface
//!
//! Runs a single handshake scenario and prints its report.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use comsim_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "comsim")]
#[command(about = "Simulate DTLS-style handshakes over a lossy shared medium")]
struct Cli {
    /// Console log level (RUST_LOG overrides it)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command)
}
