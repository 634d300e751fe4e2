//! Archivist CLI: archive URLs through a configurable plugin pipeline.
//!
//! Feeds URLs to archivers, enriches and formats what they capture, copies
//! every file to the configured storages and records the outcome in the
//! configured ledgers.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    let code = commands::run(cli).await?;
    std::process::exit(code)
}
