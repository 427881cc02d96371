use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod core;
mod config;
mod error;

use cli::Cli;
use crate::core::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting env-sync v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::new(cli.home.as_deref(), cli.config.as_deref()).await?;

    cli.execute(engine).await
}
