//! Recent journal lines for a utility's services.

use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::catalog::Catalog;
use crate::command_runner::{CommandOptions, CommandRunner, display_command};

pub const DEFAULT_LINES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// RFC 3339, absent when the journal record carries no timestamp.
    pub timestamp: Option<String>,
    pub unit: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsReport {
    pub utility: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub entries: Vec<LogEntry>,
}

/// Utility names are restricted to ASCII alphanumerics, `-` and `_`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("utility name is empty");
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        bail!("invalid character {bad:?} in utility name '{name}'");
    }
    Ok(())
}

/// Services whose journal belongs to `utility`.
pub fn services_for(catalog: &Catalog, utility: &str) -> Vec<String> {
    match catalog.get(utility) {
        Some(entry) if !entry.service_units.is_empty() => entry.service_units.clone(),
        _ => vec![format!("{utility}.service")],
    }
}

/// Parse `journalctl --output=json` output, one object per line.
pub fn parse_journal(output: &str) -> Vec<LogEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(record) => Some(entry_from_record(&record)),
            Err(e) => {
                debug!("Skipping unparsable journal line: {}", e);
                None
            }
        })
        .collect()
}

fn entry_from_record(record: &Value) -> LogEntry {
    let timestamp = record
        .get("__REALTIME_TIMESTAMP")
        .and_then(Value::as_str)
        .and_then(|micros| micros.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_micros)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));

    let unit = record
        .get("_SYSTEMD_UNIT")
        .and_then(Value::as_str)
        .map(str::to_string);

    LogEntry {
        timestamp,
        unit,
        message: record.get("MESSAGE").map(message_text).unwrap_or_default(),
    }
}

/// journald emits non-UTF-8 messages as byte arrays.
fn message_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(bytes) => {
            let bytes: Vec<u8> = bytes
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|b| u8::try_from(b).ok())
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read the last `lines` journal lines of `services`. Failures are carried in
/// the report instead of being returned.
pub fn fetch(
    runner: &dyn CommandRunner,
    utility: &str,
    services: &[String],
    lines: usize,
    timeout: Duration,
) -> LogsReport {
    let count = lines.to_string();
    let mut args: Vec<&str> = Vec::with_capacity(services.len() * 2 + 5);
    for service in services {
        args.push("-u");
        args.push(service);
    }
    args.extend(["--no-pager", "-n", count.as_str(), "--output=json"]);

    debug!(command = %display_command("journalctl", &args), "Reading journal");
    let outcome = runner
        .run_output("journalctl", &args, &CommandOptions::with_timeout(timeout))
        .and_then(|output| {
            if !output.status.success() {
                bail!(
                    "journalctl exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(parse_journal(&String::from_utf8_lossy(&output.stdout)))
        });

    match outcome {
        Ok(entries) => LogsReport {
            utility: utility.to_string(),
            error: None,
            entries,
        },
        Err(e) => LogsReport {
            utility: utility.to_string(),
            error: Some(format!("{e:#}")),
            entries: Vec::new(),
        },
    }
}
