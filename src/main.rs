//! atcwatch - watchlist and activity auditing service for VATSIM controllers

use clap::Parser;

mod api;
mod audit;
mod cid;
mod cli;
mod client;
mod config;
mod error;
mod presence;
mod store;
mod tick;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    if cli.debug {
        log::debug!("atcwatch v{}", env!("CARGO_PKG_VERSION"));
        log::debug!("Command: {:?}", cli.command);
    }

    match cli.command {
        Commands::Serve => cli::serve::run().await,
        Commands::Tick => cli::tick::run().await,
        Commands::Version => {
            println!("atcwatch version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
