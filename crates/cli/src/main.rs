//! Kanban E2E CLI - Main Entry Point
//!
//! Runs, lists and validates declarative kanban board scenarios.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{list, run, validate, RunnerArgs};

/// Kanban E2E - declarative UI scenarios for a kanban board
#[derive(Parser)]
#[command(name = "kanban-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    runner: RunnerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the board
    Run(run::RunArgs),

    /// List available scenarios
    List(list::ListArgs),

    /// Expand scenarios against their fixtures without running them
    Validate(validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.runner.load()?;

    let code = match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await?,
        Commands::List(args) => {
            list::execute(args, config, cli.format)?;
            0
        }
        Commands::Validate(args) => validate::execute(args, config, cli.format)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
