use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use redline::cli;
use redline::config::{FileConfig, RedlineConfig, load_config};

#[derive(Parser)]
#[command(name = "redline")]
#[command(about = "Edit documents together with an AI agent, one reviewed patch at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.redline)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive editing session for a document
    Session(SessionArgs),

    /// Print the resolved configuration
    Config,
}

#[derive(Parser)]
struct SessionArgs {
    /// Document id (loaded from `<documents dir>/<id>.txt`)
    document_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "redline=debug,info"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = RedlineConfig::new(cli.data_dir)?;
    let fc: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Session(args) => cli::session_command(&config, fc, &args.document_id).await,
        Commands::Config => cli::config_command(fc),
    }
}
