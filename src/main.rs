//! fwforge - Firmware build service
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fwforge::cli::{Cli, Commands};
use fwforge::config::ConfigManager;
use fwforge::error::ForgeResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ForgeResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("fwforge=warn"),
        1 => EnvFilter::new("fwforge=info"),
        _ => EnvFilter::new("fwforge=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => fwforge::cli::commands::build(args, &config).await,
        Commands::Cache(args) => fwforge::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            fwforge::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
