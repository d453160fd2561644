//! Plan-centric command infrastructure.
//!
//! Reconciliation is split into two phases:
//! 1. **Planning**: Analyze current state and produce an immutable plan (no side effects)
//! 2. **Execution**: Apply the plan's operations (all side effects happen here)
//!
//! Dry runs stop after the first phase and print the plan.

use anyhow::Result;
use owo_colors::OwoColorize;
use std::fmt;

use crate::manager::ServiceManager;
use crate::provision::Prompter;
use crate::settings::Settings;

// ============================================================================
// Core Traits
// ============================================================================

/// A command that can produce a plan without side effects.
pub trait Plannable {
    type Plan: Plan;

    /// Analyze the current state and produce a plan.
    ///
    /// This method MUST NOT have side effects. It may read files and query
    /// unit state, but must not modify anything.
    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Self::Plan>;
}

/// An immutable description of operations to perform.
pub trait Plan: Sized {
    fn describe(&self) -> PlanSummary;

    /// Execute the plan, performing all side effects.
    ///
    /// Consumes the plan since execution is a one-time operation.
    fn execute(self, ctx: &mut ExecuteContext<'_>) -> Result<ExecutionReport>;

    /// Returns true if this plan has no operations to perform.
    fn is_empty(&self) -> bool;
}

// ============================================================================
// Context Types
// ============================================================================

/// Read-only access to settings and live unit state.
pub struct PlanContext<'a> {
    settings: &'a Settings,
    manager: &'a dyn ServiceManager,
}

impl<'a> PlanContext<'a> {
    pub fn new(settings: &'a Settings, manager: &'a dyn ServiceManager) -> Self {
        Self { settings, manager }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn manager(&self) -> &dyn ServiceManager {
        self.manager
    }
}

/// Everything execution is allowed to mutate through.
pub struct ExecuteContext<'a> {
    settings: &'a Settings,
    manager: &'a dyn ServiceManager,
    prompter: &'a dyn Prompter,
    progress_callback: Option<fn(&OperationResult)>,
}

impl<'a> ExecuteContext<'a> {
    pub fn new(
        settings: &'a Settings,
        manager: &'a dyn ServiceManager,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            settings,
            manager,
            prompter,
            progress_callback: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn manager(&self) -> &dyn ServiceManager {
        self.manager
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter
    }

    /// Call `callback` after every recorded operation.
    pub fn set_progress_callback(&mut self, callback: fn(&OperationResult)) {
        self.progress_callback = Some(callback);
    }

    /// Record into `report` and notify the progress callback.
    pub fn record(&self, report: &mut ExecutionReport, result: OperationResult) {
        if let Some(callback) = self.progress_callback {
            callback(&result);
        }
        report.results.push(result);
    }
}

// ============================================================================
// Operation Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Write a config store from its template
    Provision,
    /// Write a unit file
    Install,
    Enable,
    Start,
    Stop,
    Disable,
    /// Delete a unit file
    Remove,
    /// daemon-reload
    Reload,
    /// Already in desired state
    Skip,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Provision => "Provision",
            Verb::Install => "Install",
            Verb::Enable => "Enable",
            Verb::Start => "Start",
            Verb::Stop => "Stop",
            Verb::Disable => "Disable",
            Verb::Remove => "Remove",
            Verb::Reload => "Reload",
            Verb::Skip => "Skip",
        }
    }

    pub fn colored(&self) -> String {
        match self {
            Verb::Provision | Verb::Install | Verb::Enable | Verb::Start => {
                self.as_str().green().to_string()
            }
            Verb::Stop | Verb::Disable | Verb::Remove => self.as_str().red().to_string(),
            Verb::Reload => self.as_str().yellow().to_string(),
            Verb::Skip => self.as_str().dimmed().to_string(),
        }
    }

    /// Whether systemd must re-read unit files after this operation.
    pub fn needs_reload(&self) -> bool {
        matches!(
            self,
            Verb::Install | Verb::Enable | Verb::Disable | Verb::Remove
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single operation in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    /// The target of the operation (e.g., "alpha.timer").
    pub target: String,
    pub details: Option<String>,
}

impl Operation {
    pub fn new(verb: Verb, target: impl Into<String>) -> Self {
        Self {
            verb,
            target: target.into(),
            details: None,
        }
    }

    pub fn with_details(verb: Verb, target: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            verb,
            target: target.into(),
            details: Some(details.into()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb.colored(), self.target)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details.dimmed())?;
        }
        Ok(())
    }
}

// ============================================================================
// Plan Summary
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub summary: String,
    pub operations: Vec<Operation>,
}

impl PlanSummary {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Get count of non-skip operations.
    pub fn action_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|o| o.verb != Verb::Skip)
            .count()
    }

    pub fn has_actions(&self) -> bool {
        self.action_count() > 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary.bold())?;

        if self.operations.is_empty() {
            writeln!(f, "  {}", "No operations".dimmed())?;
        } else {
            for op in &self.operations {
                writeln!(f, "  ▸ {}", op)?;
            }
        }

        let action_count = self.action_count();
        if action_count > 0 {
            writeln!(f, "\n{} operation(s) to perform", action_count)?;
        }

        Ok(())
    }
}

// ============================================================================
// Execution Report
// ============================================================================

#[derive(Debug, Clone)]
pub struct OperationResult {
    pub operation: Operation,
    pub success: bool,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn success(operation: Operation) -> Self {
        Self {
            operation,
            success: true,
            error: None,
        }
    }

    pub fn failure(operation: Operation, error: impl Into<String>) -> Self {
        Self {
            operation,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Report of plan execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub results: Vec<OperationResult>,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.success)
    }

    /// Operations of `verb` that were attempted.
    pub fn count(&self, verb: Verb) -> usize {
        self.results
            .iter()
            .filter(|r| r.operation.verb == verb)
            .count()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let success = self.success_count();
        let failed = self.failure_count();

        if failed == 0 {
            writeln!(
                f,
                "{}",
                format!("✓ Completed: {} operation(s)", success).green()
            )?;
        } else {
            writeln!(
                f,
                "{}",
                format!(
                    "⚠ Completed with {} per-unit warning(s) ({} succeeded)",
                    failed, success
                )
                .yellow()
            )?;
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for result in &self.results {
                if !result.success {
                    writeln!(
                        f,
                        "  {} {} {}: {}",
                        "✗".red(),
                        result.operation.verb,
                        result.operation.target,
                        result.error.as_deref().unwrap_or("Unknown error")
                    )?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_display() {
        assert_eq!(Verb::Install.as_str(), "Install");
        assert_eq!(Verb::Remove.as_str(), "Remove");
        assert_eq!(Verb::Reload.to_string(), "Reload");
    }

    #[test]
    fn test_verb_needs_reload() {
        assert!(Verb::Install.needs_reload());
        assert!(Verb::Remove.needs_reload());
        assert!(!Verb::Start.needs_reload());
        assert!(!Verb::Provision.needs_reload());
    }

    #[test]
    fn test_operation_display() {
        let op = Operation::with_details(Verb::Enable, "alpha.service", "started by alpha.timer");
        let display = format!("{}", op);
        assert!(display.contains("alpha.service"));
        assert!(display.contains("started by alpha.timer"));
    }

    #[test]
    fn test_plan_summary_action_count() {
        let mut summary = PlanSummary::new("Test");
        summary.add_operation(Operation::new(Verb::Install, "a"));
        summary.add_operation(Operation::new(Verb::Skip, "b"));
        summary.add_operation(Operation::new(Verb::Enable, "c"));

        assert_eq!(summary.action_count(), 2);
        assert!(summary.has_actions());
    }

    #[test]
    fn test_execution_report() {
        let mut report = ExecutionReport::new();
        for verb in [Verb::Install, Verb::Enable] {
            report
                .results
                .push(OperationResult::success(Operation::new(verb, "a.service")));
        }
        report.results.push(OperationResult::failure(
            Operation::new(Verb::Start, "a.service"),
            "Permission denied",
        ));

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.count(Verb::Start), 1);
        assert!(report.has_failures());
        assert!(!report.all_succeeded());

        let rendered = report.to_string();
        assert!(rendered.contains("1 per-unit warning"));
        assert!(rendered.contains("Permission denied"));
    }
}
