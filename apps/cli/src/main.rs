//! webextract CLI: assemble retrieval context for extraction templates.
//!
//! Scrapes a template's URL, embeds its content blocks into the vector
//! index, and prints the context retrieved for the template's attributes.

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
