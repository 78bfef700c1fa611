use std::process::ExitCode;

use clap::Parser;
use dropship::Settings;
use dropship::cli::{Cli, Commands, commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command() {
        Commands::Config => commands::config::run(&settings),
        Commands::Identify { file_name } => {
            return if commands::identify::run(file_name) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
        Commands::Deploy { archive } => commands::deploy::run(&settings, archive).await.map(|_| ()),
        Commands::Watch => commands::watch::run(&settings).await.map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("[agent] {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
