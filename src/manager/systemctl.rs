//! `systemctl` subprocess backend.

use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{DISABLED, INACTIVE, ServiceManager, UnitAction, UnitRecord};
use crate::command_runner::{CommandOptions, CommandRunner, display_command};
use crate::error::SyncError;

pub struct SystemctlManager {
    runner: Arc<dyn CommandRunner>,
    options: CommandOptions,
}

impl SystemctlManager {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            options: CommandOptions::with_timeout(timeout),
        }
    }

    /// `systemctl is-active|is-enabled` print the state even on non-zero exit.
    fn state(&self, verb: &str, unit: &str, fallback: &str) -> Result<String> {
        let output = self
            .runner
            .run_output("systemctl", &[verb, unit], &self.options)?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if state.is_empty() {
            fallback.to_string()
        } else {
            state
        })
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let output = self.runner.run_output("systemctl", args, &self.options)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` exited with {}: {}",
                display_command("systemctl", args),
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl ServiceManager for SystemctlManager {
    fn query(&self, unit: &str) -> Result<UnitRecord> {
        let active = self.state("is-active", unit, INACTIVE)?;
        let enabled = self.state("is-enabled", unit, DISABLED)?;
        debug!(unit, active = %active, enabled = %enabled, "Queried unit");
        Ok(UnitRecord::new(unit, active, enabled))
    }

    fn apply(&self, action: UnitAction, unit: &str) -> Result<()> {
        self.run(&[action.as_str(), unit]).map_err(|e| {
            SyncError::UnitAction {
                action,
                unit: unit.to_string(),
                reason: format!("{e:#}"),
            }
            .into()
        })
    }

    fn daemon_reload(&self) -> Result<()> {
        self.run(&["daemon-reload"])
    }

    fn probe(&self) -> Result<String> {
        let output = self
            .runner
            .run_output("systemctl", &["--version"], &self.options)?;
        if !output.status.success() {
            bail!("systemctl --version exited with {}", output.status);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("systemctl").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;

    /// Returns canned output per command line and records every call.
    #[derive(Default)]
    struct ScriptedRunner {
        responses: Vec<(String, i32, &'static str)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn respond(mut self, command: &str, code: i32, stdout: &'static str) -> Self {
            self.responses.push((command.to_string(), code, stdout));
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run_output(
            &self,
            program: &str,
            args: &[&str],
            options: &CommandOptions,
        ) -> Result<Output> {
            assert!(options.timeout.is_some(), "systemctl calls must be bounded");
            let line = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(line.clone());
            let (code, stdout) = self
                .responses
                .iter()
                .find(|(cmd, _, _)| *cmd == line)
                .map(|(_, code, stdout)| (*code, *stdout))
                .unwrap_or((0, ""));
            Ok(Output {
                status: ExitStatus::from_raw(code << 8),
                stdout: stdout.as_bytes().to_vec(),
                stderr: b"boom".to_vec(),
            })
        }
    }

    fn manager(runner: ScriptedRunner) -> (SystemctlManager, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (
            SystemctlManager::new(runner.clone(), Duration::from_secs(1)),
            runner,
        )
    }

    #[test]
    fn test_query_reads_states_despite_exit_code() {
        let runner = ScriptedRunner::default()
            .respond("systemctl is-active alpha.service", 3, "inactive\n")
            .respond("systemctl is-enabled alpha.service", 0, "enabled\n");
        let (manager, _) = manager(runner);

        let record = manager.query("alpha.service").unwrap();
        assert_eq!(record.active_state, "inactive");
        assert_eq!(record.enabled_state, "enabled");
    }

    #[test]
    fn test_query_empty_output_uses_sentinels() {
        let (manager, _) = manager(ScriptedRunner::default());
        let record = manager.query("alpha.timer").unwrap();
        assert_eq!(record.active_state, INACTIVE);
        assert_eq!(record.enabled_state, DISABLED);
    }

    #[test]
    fn test_apply_failure_is_unit_action_error() {
        let runner = ScriptedRunner::default().respond("systemctl start alpha.service", 1, "");
        let (manager, _) = manager(runner);

        let err = manager
            .apply(UnitAction::Start, "alpha.service")
            .unwrap_err();
        let sync_err = err.downcast_ref::<SyncError>().unwrap();
        assert!(matches!(
            sync_err,
            SyncError::UnitAction { action: UnitAction::Start, .. }
        ));
        assert!(!sync_err.is_fatal());
    }

    #[test]
    fn test_apply_and_reload_commands() {
        let (manager, runner) = manager(ScriptedRunner::default());
        manager.apply(UnitAction::Enable, "alpha.timer").unwrap();
        manager.daemon_reload().unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["systemctl enable alpha.timer", "systemctl daemon-reload"]
        );
    }
}
