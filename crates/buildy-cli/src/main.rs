//! buildy - watches branches and builds every new commit.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "buildy")]
#[command(about = "Branch-watching continuous integration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured branches and build every change
    Run {
        /// Path to the configuration file
        #[arg(long, env = "BUILDY_CONFIG", default_value = "buildy.kdl")]
        config: PathBuf,

        /// Write logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Log filter, overrides RUST_LOG (e.g. "debug" or "buildy_scheduler=debug")
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "buildy.kdl")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_file,
            log_level,
        } => {
            init_logging(log_file.as_deref(), log_level.as_deref());
            commands::run::run(&config).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}

fn env_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Log to `log_file` when given and writable, otherwise to stderr.
fn init_logging(log_file: Option<&Path>, level: Option<&str>) {
    let file = log_file.map(|path| (path, fs::File::create(path)));

    match file {
        Some((_, Ok(file))) => {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(env_filter(level))
                .init();
        }
        Some((path, Err(e))) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(level))
                .init();
            warn!(path = %path.display(), error = %e, "Cannot open log file, logging to stderr");
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(level))
                .init();
        }
    }
}
