//! Refshot CLI - Main Entry Point
//!
//! Drives the Refshot runner from the terminal: inspect the result tree,
//! run tests and accept new reference screenshots.

use clap::{Parser, Subcommand};
use refshot_gui::GuiConfig;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod output;

use commands::{accept, run, tree};

/// Refshot - screenshot testing runner
#[derive(Parser)]
#[command(name = "refshot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "refshot.toml", global = true)]
    config: PathBuf,

    /// Report directory (overrides the configuration)
    #[arg(long, env = "REFSHOT_REPORT_PATH", global = true)]
    report_path: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the result tree built from discovery and the last report
    Tree(tree::TreeArgs),

    /// Run all tests or a selection
    Run(run::RunArgs),

    /// Accept the screenshots of every failed test as references
    AcceptFailed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    debug!("Refshot v{}", refshot_common::VERSION);

    let mut config = GuiConfig::load(&cli.config)?;
    if let Some(report_path) = cli.report_path {
        config.report_path = report_path;
    }
    info!("Using report directory {}", config.report_path.display());

    match cli.command {
        Commands::Tree(args) => tree::execute(args, config, cli.format).await?,
        Commands::Run(args) => run::execute(args, config, cli.format).await?,
        Commands::AcceptFailed => accept::execute(config).await?,
    }

    Ok(())
}
