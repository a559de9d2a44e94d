// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Blue/green release orchestration with gradual traffic ramps")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (defaults to discovery in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new switchyard.yml configuration file
    Init {
        /// Image repository to deploy
        #[arg(short, long)]
        image: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy a version to an environment's inactive color
    Deploy {
        /// Target environment (defined in config)
        #[arg(short, long)]
        environment: String,

        /// Version to release; used as the image tag
        #[arg(long = "version", id = "release_version")]
        version: String,

        /// Candidate traffic share applied right after the health gate
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
        initial_traffic: u8,
    },

    /// Re-evaluate the recorded deployment after an interruption
    Recover {
        #[arg(short, long)]
        environment: String,
    },

    /// Roll back the last completed deployment
    Rollback {
        #[arg(short, long)]
        environment: String,
    },

    /// Apply a manual traffic split to the last completed deployment
    Switch {
        #[arg(short, long)]
        environment: String,

        /// Percent of traffic for blue
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        blue: u8,

        /// Percent of traffic for green
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        green: u8,
    },

    /// Show the last recorded deployment and its metrics
    Status {
        #[arg(short, long)]
        environment: String,
    },
}
