//! Logs command implementation.

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;

use crate::catalog::Catalog;
use crate::cli::OutputFormat;
use crate::command_runner::RealCommandRunner;
use crate::logs::{self, DEFAULT_LINES};
use crate::output::Output;
use crate::settings::{Overrides, Settings};

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Utility whose services to read
    pub utility: String,

    /// Number of journal lines
    #[arg(short = 'l', long, default_value_t = DEFAULT_LINES)]
    pub lines: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub fn run(args: LogsArgs, overrides: &Overrides) -> Result<()> {
    logs::validate_name(&args.utility)?;
    let settings = Settings::resolve(overrides)?;

    // A missing root only loses the catalog's service names.
    let services = match Catalog::scan(&settings.root) {
        Ok(catalog) => logs::services_for(&catalog, &args.utility),
        Err(e) => {
            tracing::debug!("Catalog unavailable: {}", e);
            vec![format!("{}.service", args.utility)]
        }
    };

    let report = logs::fetch(
        &RealCommandRunner,
        &args.utility,
        &services,
        args.lines,
        settings.command_timeout,
    );

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(error) = &report.error {
        Output::error(format!("Could not read logs for {}: {}", args.utility, error));
        return Ok(());
    }
    if report.entries.is_empty() {
        Output::info(format!("No journal entries for {}", args.utility));
        return Ok(());
    }
    for entry in &report.entries {
        println!(
            "{} {} {}",
            entry.timestamp.as_deref().unwrap_or("-").dimmed(),
            entry.unit.as_deref().unwrap_or("").cyan(),
            entry.message
        );
    }
    Ok(())
}
