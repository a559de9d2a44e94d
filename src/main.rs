// ABOUTME: Entry point for the switchyard CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::path::Path;
use switchyard::config::{self, Config};
use switchyard::error::{Error, Result};
use switchyard::output::{Output, OutputMode};
use switchyard::types::EnvironmentName;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    match cli.command {
        Commands::Init { image, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy {
            environment,
            version,
            initial_traffic,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let environment = parse_environment(&environment)?;
            commands::deploy(config, environment, version, initial_traffic, output).await
        }
        Commands::Recover { environment } => {
            let config = load_config(cli.config.as_deref())?;
            let environment = parse_environment(&environment)?;
            commands::recover(config, environment, output).await
        }
        Commands::Rollback { environment } => {
            let config = load_config(cli.config.as_deref())?;
            let environment = parse_environment(&environment)?;
            commands::rollback(config, environment, output).await
        }
        Commands::Switch {
            environment,
            blue,
            green,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let environment = parse_environment(&environment)?;
            commands::switch(config, environment, blue, green, output).await
        }
        Commands::Status { environment } => {
            let config = load_config(cli.config.as_deref())?;
            let environment = parse_environment(&environment)?;
            commands::status(&config, environment, &output)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

fn parse_environment(name: &str) -> Result<EnvironmentName> {
    EnvironmentName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))
}
