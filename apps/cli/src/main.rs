//! akuforge CLI, a local-first knowledge unit migration tool.
//!
//! Scans a tree of loosely-structured documents, extracts typed knowledge
//! units with completion scores and relationships, and drives the staged
//! migration into a graph-backed store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
