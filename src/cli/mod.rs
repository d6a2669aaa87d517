//! Command-line interface for atcwatch

use clap::{Parser, Subcommand};

pub mod serve;
pub mod tick;

#[derive(Parser)]
#[command(
    name = "atcwatch",
    about = "Watchlist and activity auditing service for VATSIM controllers",
    version
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the dashboard API and run the scheduled tick loop
    Serve,

    /// Run one scheduled tick and exit (cron entry point)
    Tick,

    /// Print version information
    Version,
}
