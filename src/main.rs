use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rpu::commands;
use rpu::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing with RUST_LOG env filter
    // e.g., RUST_LOG=rpu=debug
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    tracing::debug!(dry_run = cli.dry_run, backend = ?cli.backend, "Parsed command line");

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, &overrides, cli.dry_run),
        Commands::Logs(args) => commands::logs::run(args, &overrides),
        Commands::List(args) => commands::list::run(args, &overrides),
        Commands::Doctor => commands::doctor::run(&overrides),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
