//! Sync command implementation.
//!
//! `rpu sync` reconciles; `rpu sync --status` only reports.

use anyhow::Result;
use clap::Args;
use tracing::debug;

use super::{ensure_privileged, load_inputs, precondition};
use crate::cli::OutputFormat;
use crate::manager;
use crate::output::Output;
use crate::plan::{ExecuteContext, Plan, PlanContext, Plannable};
use crate::provision;
use crate::reconcile::SyncCommand;
use crate::settings::{Overrides, Settings};
use crate::status;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Report declared versus live state without changing anything
    #[arg(long)]
    pub status: bool,

    /// Output format for --status
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Provision config stores with template defaults instead of prompting
    #[arg(long)]
    pub accept_defaults: bool,
}

pub fn run(args: SyncArgs, overrides: &Overrides, dry_run: bool) -> Result<()> {
    let settings = Settings::resolve(overrides)?;
    debug!(root = %settings.root.display(), unit_dir = %settings.unit_dir.display(), "Resolved settings");

    let (desired, catalog) = load_inputs(&settings)?;

    if args.status {
        let manager = manager::connect(&settings)?;
        let report = status::report(&catalog, &desired, &settings.unit_dir, manager.as_ref())?;
        match args.format {
            OutputFormat::Json => println!("{}", report.to_json()?),
            OutputFormat::Table => print!("{}", report.render_table()),
        }
        return Ok(());
    }

    if !dry_run {
        ensure_privileged(&settings.unit_dir).map_err(precondition)?;
    }

    let manager = manager::connect(&settings)?;
    let command = SyncCommand::new(desired, catalog);
    let plan = command.plan(&PlanContext::new(&settings, manager.as_ref()))?;

    for name in plan.ignored() {
        Output::warning(format!("Declared utility '{name}' not found; ignoring"));
    }

    if plan.is_empty() {
        Output::success("Already in sync");
        return Ok(());
    }

    print!("{}", plan.describe());
    if dry_run {
        Output::dry_run("No changes made");
        return Ok(());
    }
    Output::blank();

    let prompter = provision::prompter_for(args.accept_defaults || settings.accept_defaults);
    let mut ctx = ExecuteContext::new(&settings, manager.as_ref(), prompter.as_ref());
    ctx.set_progress_callback(Output::operation);
    let report = plan.execute(&mut ctx)?;

    Output::blank();
    print!("{report}");
    Ok(())
}
