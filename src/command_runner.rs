//! Abstraction over external command execution for testability.
//!
//! This module provides the [`CommandRunner`] trait, which abstracts the
//! external commands rpu invokes (`systemctl`, `journalctl`) behind a trait
//! object, so callers can be tested without spawning subprocesses.
//!
//! [`RealCommandRunner`] delegates to [`std::process::Command`] and enforces
//! the timeout carried in [`CommandOptions`]: a child that outlives it is
//! killed and the call fails instead of hanging the run.

use anyhow::{Context, Result, bail};
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Trait for abstracting external command execution.
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its full output (stdout + stderr + exit status).
    ///
    /// A non-zero exit status is returned as `Ok`; only spawn failures and
    /// timeouts are errors.
    fn run_output(&self, program: &str, args: &[&str], options: &CommandOptions) -> Result<Output>;
}

/// Options for command execution.
#[derive(Debug, Default, Clone)]
pub struct CommandOptions {
    /// Kill the command if it has not exited after this long.
    pub timeout: Option<Duration>,
}

impl CommandOptions {
    /// Create options with a timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Production implementation that delegates to [`std::process::Command`].
pub struct RealCommandRunner;

impl CommandRunner for RealCommandRunner {
    fn run_output(&self, program: &str, args: &[&str], options: &CommandOptions) -> Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        debug!(command = %display_command(program, args), "Running command");

        let Some(timeout) = options.timeout else {
            return cmd
                .output()
                .with_context(|| format!("Failed to run '{program}'"));
        };

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run '{program}'"))?;

        // Drain pipes on threads so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, timeout).with_context(|| {
            format!(
                "'{}' did not finish within {}s",
                display_command(program, args),
                timeout.as_secs()
            )
        })?;

        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                warn!("Failed to kill timed out child: {}", e);
            }
            let _ = child.wait();
            bail!("timed out");
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Shell-quoted rendering of a command line, for logs and dry runs.
pub fn display_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program];
    parts.extend_from_slice(args);
    shlex::try_join(parts).unwrap_or_else(|_| format!("{} {}", program, args.join(" ")))
}
