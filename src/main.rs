//! Buildwright - build worker CLI
//!
//! CLI entry point that dispatches to subcommands.

use buildwright::cli::{Cli, Commands};
use buildwright::config::{Config, ConfigManager};
use buildwright::error::BuildwrightResult;
use clap::Parser;
use console::style;
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

fn init_logging(verbose: u8, config: &Config) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("buildwright=warn"),
        1 => EnvFilter::new("buildwright=info"),
        _ => EnvFilter::new("buildwright=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}

async fn run() -> BuildwrightResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => buildwright::cli::commands::build(args, &config).await,
        Commands::DeployHost(args) => buildwright::cli::commands::deploy_host(args, &config).await,
        Commands::DeployModule(args) => {
            buildwright::cli::commands::deploy_module(args, &config).await
        }
        Commands::Check(args) => buildwright::cli::commands::check(args, &config).await,
        Commands::Platforms(args) => buildwright::cli::commands::platforms(args, &config).await,
        Commands::Config(args) => {
            buildwright::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
