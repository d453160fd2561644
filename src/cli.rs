//! CLI argument definitions for rpu.
//!
//! Separated from `main.rs` so that shell completion generation can reference
//! these types.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands;
use crate::settings::{Backend, Overrides};

#[derive(Debug, Parser)]
#[command(name = "rpu")]
#[command(about = "Reconcile declared utilities against systemd units")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Utilities source tree (default: nearest directory with utilities.conf)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Declaration of enabled utilities (default: <root>/utilities.conf)
    #[arg(long, global = true, value_name = "FILE")]
    pub declaration: Option<PathBuf>,

    /// Directory systemd loads unit files from
    #[arg(long, global = true, value_name = "DIR")]
    pub unit_dir: Option<PathBuf>,

    /// Directory holding per-utility config stores
    #[arg(long, global = true, value_name = "DIR")]
    pub config_root: Option<PathBuf>,

    /// How to talk to systemd
    #[arg(long, value_enum, global = true)]
    pub backend: Option<Backend>,

    /// Show what would be done without making changes
    #[arg(long, short = 'n', global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            declaration: self.declaration.clone(),
            unit_dir: self.unit_dir.clone(),
            config_root: self.config_root.clone(),
            backend: self.backend,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Converge installed units to the declared utilities
    ///
    /// Installs, enables and starts every declared utility, and stops,
    /// disables and removes the units of every other one. With --status,
    /// only reports.
    Sync(commands::sync::SyncArgs),

    /// Show recent journal lines of a utility
    Logs(commands::logs::LogsArgs),

    /// List the utilities found under the root
    #[command(alias = "ls")]
    List(commands::list::ListArgs),

    /// Check that this host can be reconciled
    Doctor,

    /// Generate shell completions
    Completions(commands::completions::CompletionsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Table,
    /// JSON output
    Json,
}
