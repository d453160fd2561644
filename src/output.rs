//! Output helpers for consistent CLI output.
//!
//! User-facing messages go through [`Output`] with colored glyph prefixes;
//! diagnostics go through `tracing` on stderr.
//!
//! # Example
//!
//! ```rust,ignore
//! use rpu::output::Output;
//!
//! Output::success("Installed 2 units");
//! Output::warning("Declared utility 'ghost' not found");
//!
//! let spinner = Output::spinner("Querying systemd...");
//! // ... do work ...
//! spinner.finish_success("systemd 255");
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::borrow::Cow;
use std::time::Duration;

use crate::plan::OperationResult;

/// Standard output helper for consistent CLI formatting.
pub struct Output;

impl Output {
    /// Print a success message with a green checkmark.
    ///
    /// Example: `✓ Installed 2 units`
    pub fn success(msg: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), msg.as_ref());
    }

    /// Print an error message with a red X to stderr.
    pub fn error(msg: impl AsRef<str>) {
        eprintln!("{} {}", "✗".red().bold(), msg.as_ref().red());
    }

    /// Print a warning message with a yellow warning symbol.
    pub fn warning(msg: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow(), msg.as_ref());
    }

    /// Print an info/status message with a cyan arrow.
    pub fn info(msg: impl AsRef<str>) {
        println!("{} {}", "→".cyan(), msg.as_ref().dimmed());
    }

    /// Print a header/section title.
    pub fn header(msg: impl AsRef<str>) {
        println!("\n{}\n", msg.as_ref().bold().cyan());
    }

    /// Print an item in a list (indented).
    pub fn list_item(msg: impl AsRef<str>) {
        println!("  {}", msg.as_ref());
    }

    /// Print a key-value pair with alignment.
    ///
    /// Example: `  Template:      yes`
    pub fn kv(key: impl AsRef<str>, value: impl AsRef<str>) {
        println!("  {:<14} {}", format!("{}:", key.as_ref()).cyan(), value.as_ref());
    }

    /// Print a hint/suggestion message (indented with arrow).
    ///
    /// Example: `  → Run: sudo rpu sync`
    pub fn hint(msg: impl AsRef<str>) {
        println!("  {} {}", "→".cyan(), msg.as_ref());
    }

    /// Print a dry-run message.
    ///
    /// Example: `[dry-run] No changes made`
    pub fn dry_run(msg: impl AsRef<str>) {
        println!("{} {}", "[dry-run]".dimmed(), msg.as_ref().dimmed());
    }

    /// Print one executed operation as it completes.
    pub fn operation(result: &OperationResult) {
        let op = &result.operation;
        if result.success {
            println!("  {} {} {}", "✓".green(), op.verb.colored(), op.target);
        } else {
            println!(
                "  {} {} {}: {}",
                "✗".red(),
                op.verb.colored(),
                op.target,
                result.error.as_deref().unwrap_or("failed").dimmed()
            );
        }
    }

    /// Create a spinner for long-running operations.
    ///
    /// The spinner will animate until you call `finish_*` on it.
    pub fn spinner(msg: impl Into<Cow<'static, str>>) -> Spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(80));
        Spinner(pb)
    }

    /// Print a blank line.
    pub fn blank() {
        println!();
    }
}

/// A spinner for long-running operations.
///
/// Created via `Output::spinner()`.
pub struct Spinner(ProgressBar);

impl Spinner {
    /// Finish with a success message.
    pub fn finish_success(self, msg: impl AsRef<str>) {
        self.0
            .finish_with_message(format!("{} {}", "✓".green().bold(), msg.as_ref()));
    }

    /// Finish with an error message.
    pub fn finish_error(self, msg: impl AsRef<str>) {
        self.0
            .finish_with_message(format!("{} {}", "✗".red().bold(), msg.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Operation, Verb};

    #[test]
    fn test_output_methods_dont_panic() {
        Output::success("test");
        Output::error("test");
        Output::warning("test");
        Output::info("test");
        Output::hint("test");
        Output::dry_run("test");
        Output::kv("key", "value");
        Output::blank();
        Output::operation(&OperationResult::failure(
            Operation::new(Verb::Start, "alpha.service"),
            "boom",
        ));
    }

    #[test]
    fn test_spinner_lifecycle() {
        let spinner = Output::spinner("Testing...");
        spinner.finish_success("Done");
    }
}
