//! Status reporter: read-only view of declared versus live unit state.
//!
//! Nothing here mutates. Live state is only queried for utilities that are
//! declared enabled, and a failed query is reported as `inactive`/`disabled`.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

use crate::catalog::Catalog;
use crate::desired::DesiredState;
use crate::manager::{ServiceManager, UnitRecord, query_or_sentinel};

#[derive(Debug, Clone, Serialize)]
pub struct UtilityStatus {
    pub utility: String,
    pub desired: bool,
    pub managed: bool,
    pub units: Vec<UnitRecord>,
    /// Declared unit names with no installed file.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub declaration_found: bool,
    pub utilities: Vec<UtilityStatus>,
    /// Declared names with no catalog entry.
    pub ignored: Vec<String>,
}

/// Build the report for every catalog entry, in catalog order.
pub fn report(
    catalog: &Catalog,
    desired: &DesiredState,
    unit_dir: &Path,
    manager: &dyn ServiceManager,
) -> Result<StatusReport> {
    let mut utilities = Vec::with_capacity(catalog.entries().len());

    for entry in catalog.entries() {
        let is_desired = desired.contains(&entry.name);
        let mut units = Vec::new();
        let mut missing = Vec::new();

        if is_desired && entry.has_units {
            for unit in entry.unit_names() {
                if unit_dir.join(unit).is_file() {
                    units.push(query_or_sentinel(manager, unit));
                } else {
                    missing.push(unit.to_string());
                }
            }
        } else {
            debug!(utility = %entry.name, "Not querying undeclared utility");
        }

        utilities.push(UtilityStatus {
            utility: entry.name.clone(),
            desired: is_desired,
            managed: entry.has_units,
            units,
            missing,
        });
    }

    let ignored = desired
        .names()
        .filter(|name| catalog.get(name).is_none())
        .map(str::to_string)
        .collect();

    Ok(StatusReport {
        declaration_found: desired.was_found(),
        utilities,
        ignored,
    })
}

impl StatusReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable table.
    pub fn render_table(&self) -> String {
        let mut out = String::new();

        if !self.declaration_found {
            let _ = writeln!(
                out,
                "{}",
                "No declaration file; every utility is treated as disabled".yellow()
            );
        }

        let _ = writeln!(
            out,
            "{:<24} {:<8} {:<32} {:<12} {}",
            "UTILITY".bold(),
            "DESIRED".bold(),
            "UNIT".bold(),
            "ACTIVE".bold(),
            "ENABLED".bold()
        );

        for status in &self.utilities {
            let desired = if status.desired {
                format!("{:<8}", "yes").green().to_string()
            } else {
                format!("{:<8}", "no").dimmed().to_string()
            };

            if !status.managed {
                let _ = writeln!(
                    out,
                    "{:<24} {} {}",
                    status.utility,
                    desired,
                    "(no units)".dimmed()
                );
                continue;
            }

            if status.units.is_empty() && status.missing.is_empty() {
                let _ = writeln!(out, "{:<24} {} {}", status.utility, desired, "-".dimmed());
                continue;
            }

            let mut name = status.utility.as_str();
            for unit in &status.units {
                let active = format!("{:<12}", unit.active_state);
                let active = if unit.is_active() {
                    active.green().to_string()
                } else {
                    active.red().to_string()
                };
                let enabled = if unit.is_enabled() {
                    unit.enabled_state.green().to_string()
                } else {
                    unit.enabled_state.red().to_string()
                };
                let _ = writeln!(
                    out,
                    "{:<24} {} {:<32} {} {}",
                    name, desired, unit.name, active, enabled
                );
                name = "";
            }
            for unit in &status.missing {
                let _ = writeln!(
                    out,
                    "{:<24} {} {:<32} {}",
                    name,
                    desired,
                    unit,
                    "not installed".yellow()
                );
                name = "";
            }
        }

        if !self.ignored.is_empty() {
            let _ = writeln!(
                out,
                "\n{} {}",
                "Declared but not found:".yellow(),
                self.ignored.join(", ")
            );
        }

        out
    }
}
