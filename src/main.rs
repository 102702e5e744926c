//! Stratus - Two-tier build artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stratus::cli::{commands, Cli, Commands};
use stratus::config::ConfigManager;
use stratus::error::StratusResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StratusResult<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => EnvFilter::new("stratus=warn"),
        1 => EnvFilter::new("stratus=info"),
        _ => EnvFilter::new("stratus=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Load configuration
    let manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = manager.load().await?;

    // Dispatch to command
    match cli.command {
        Commands::Clean(args) => commands::clean(args, &config).await,
        Commands::Stats(args) => commands::stats(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &manager).await,
    }
}
