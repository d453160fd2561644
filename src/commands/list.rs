//! List command implementation.

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;

use super::load_inputs;
use crate::cli::OutputFormat;
use crate::output::Output;
use crate::settings::{Overrides, Settings};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ListedUtility<'a> {
    name: &'a str,
    declared: bool,
    managed: bool,
    services: &'a [String],
    timers: &'a [String],
    config_template: bool,
}

pub fn run(args: ListArgs, overrides: &Overrides) -> Result<()> {
    let settings = Settings::resolve(overrides)?;
    let (desired, catalog) = load_inputs(&settings)?;

    let listed: Vec<ListedUtility<'_>> = catalog
        .entries()
        .iter()
        .map(|entry| ListedUtility {
            name: &entry.name,
            declared: desired.contains(&entry.name),
            managed: entry.has_units,
            services: &entry.service_units,
            timers: &entry.timer_units,
            config_template: entry.config_template.is_some(),
        })
        .collect();

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    Output::header(format!("Utilities in {}", settings.root.display()));
    if listed.is_empty() {
        Output::info("No utilities found");
        return Ok(());
    }

    for utility in &listed {
        let marker = if utility.declared {
            "●".green().to_string()
        } else {
            "○".dimmed().to_string()
        };
        println!("{} {}", marker, utility.name.bold());
        if !utility.managed {
            Output::list_item("(no units)".dimmed().to_string());
            continue;
        }
        if !utility.timers.is_empty() {
            Output::kv("Timers", utility.timers.join(", "));
        }
        if !utility.services.is_empty() {
            Output::kv("Services", utility.services.join(", "));
        }
        Output::kv("Template", if utility.config_template { "yes" } else { "no" });
    }
    Ok(())
}
