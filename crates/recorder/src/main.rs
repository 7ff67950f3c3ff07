//! Recorder command-line launcher

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recorder::config::{default_config_path, RecorderConfig};
use recorder_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "recorder", about = "Watch an upload folder and record extracted events")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: $RECORDER_HOME/config.toml)
    #[arg(long, global = true, env = "RECORDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the upload directory until Ctrl-C
    Watch {
        /// Override the configured upload directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Query and edit stored events
    Events {
        #[command(subcommand)]
        action: cli::events::EventsAction,
    },

    /// Open the store, add missing columns and print the live layout
    Migrate,
}

fn run_command(cli: Cli, config: RecorderConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start Tokio runtime")?;
    match cli.command {
        Commands::Watch { dir } => runtime.block_on(cli::watch::run(config, dir)),
        Commands::Events { action } => runtime.block_on(cli::events::run(&config, action)),
        Commands::Migrate => runtime.block_on(cli::migrate::run(&config)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match RecorderConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(2);
        }
    };

    if let Err(err) = init_logging(LogConfig {
        log_dir: &config.paths.log_dir,
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:?}", err);
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
