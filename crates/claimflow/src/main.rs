//! Claimflow - micro-batch ingestion of claim files
//!
//! Usage:
//!   claimflow run                  # Poll the watch directory until SIGINT/SIGTERM
//!   claimflow once --json          # Run a single cycle and print its report
//!   claimflow pending              # List files the next cycle would pick up
//!   claimflow init-config          # Write a default claimflow.toml

use anyhow::Result;
use clap::{Parser, Subcommand};
use claimflow_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::settings::PathOverrides;

#[derive(Parser, Debug)]
#[command(name = "claimflow", version, about = "Claim ingestion micro-batch pipeline")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "CLAIMFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: PathOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the watch directory on a fixed interval until interrupted
    Run,

    /// Run a single poll cycle and exit
    Once {
        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List claim files waiting in the watch directory
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a config file holding the default settings
    InitConfig {
        /// Destination of the config file
        #[arg(default_value = "claimflow.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = claimflow_logging::init_logging(LogConfig {
        app_name: "claimflow",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    if let Commands::InitConfig { path, force } = &cli.command {
        return cli::settings::init_config(path, *force);
    }

    let config = cli::settings::resolve(cli.config.as_deref(), &cli.overrides)?;
    match cli.command {
        Commands::Run => cli::run::run(config),
        Commands::Once { json } => cli::report::once(config, json),
        Commands::Pending { json } => cli::report::pending(config, json),
        Commands::InitConfig { .. } => Ok(()),
    }
}
