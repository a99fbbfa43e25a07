//! `platewatch` worker binary.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::{error, info};

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,platewatch=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    info!("Starting PlateWatch v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.config.as_deref();
    let result = match cli.command.unwrap_or_default() {
        Commands::Run => commands::run::execute(config, cli.shard.as_deref()).await,
        Commands::Finalize {
            shards,
            wait_secs,
            poll_secs,
        } => commands::finalize::execute(config, shards, wait_secs, poll_secs).await,
        Commands::Status => commands::status::execute(config, cli.shard.as_deref()).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
