//! Flash console - Main Entry Point

use anyhow::Result;
use clap::Parser;

mod cli;
mod command;
mod dispatcher;
mod hexdump;
mod image;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = cli::Cli::parse();
    cli::run(cli).await
}
