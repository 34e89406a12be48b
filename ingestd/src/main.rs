#![forbid(unsafe_code)]

mod application;
mod presentation;

use clap::Parser;
use ingest_core::config::Config;
use ingest_core::error::Result;
use presentation::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.worker.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(config = ?cli.config, "configuration loaded");

    application::run(cli, config).await
}
