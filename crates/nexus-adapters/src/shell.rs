//! System shell runner -- execute commands with a configurable working
//! directory and timeout.
//!
//! Wraps `tokio::process::Command` to provide async command execution through
//! `sh -c` (or `cmd /C` on Windows).  Output is truncated to
//! [`MAX_OUTPUT_BYTES`] (100 KB) to prevent memory exhaustion from runaway
//! commands, and trimmed of surrounding whitespace.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{CommandOutput, ShellRunner};

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum output size in bytes (100 KB).  Stdout and stderr are each
/// independently truncated to this limit.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// [`ShellRunner`] backed by the platform shell.
#[derive(Debug, Clone)]
pub struct SystemShell {
    /// Working directory for commands; `None` inherits the process cwd.
    working_dir: Option<PathBuf>,
    /// Timeout for command execution in seconds.
    timeout_secs: u64,
}

impl Default for SystemShell {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SystemShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the timeout for command execution.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn command(&self, command: &str) -> tokio::process::Command {
        let mut cmd = if cfg!(windows) {
            let mut c = tokio::process::Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ShellRunner for SystemShell {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        if command.trim().is_empty() {
            return Err(AdapterError::InvalidInput("empty shell command".into()));
        }

        debug!(
            command = command,
            timeout_secs = self.timeout_secs,
            "executing shell command"
        );

        let child = self
            .command(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterError::ExecutionFailed {
                operation: "shell".into(),
                reason: format!("failed to spawn process: {e}"),
            })?;

        // Wait with timeout.  `wait_with_output` takes ownership, so on
        // timeout the child is dropped and killed via `kill_on_drop(true)`.
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let (stdout, stdout_truncated) = truncate_output(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output(&output.stderr);

                debug!(
                    exit_code = exit_code,
                    stdout_truncated = stdout_truncated,
                    stderr_truncated = stderr_truncated,
                    "command completed"
                );

                Ok(CommandOutput {
                    stdout: stdout.trim().to_string(),
                    stderr: stderr.trim().to_string(),
                    exit_code,
                })
            }
            Ok(Err(e)) => Err(AdapterError::ExecutionFailed {
                operation: "shell".into(),
                reason: format!("process error: {e}"),
            }),
            Err(_) => {
                warn!(
                    command = command,
                    timeout_secs = self.timeout_secs,
                    "command timed out"
                );
                Err(AdapterError::Timeout {
                    seconds: self.timeout_secs,
                    reason: format!("shell command `{command}` exceeded time limit"),
                })
            }
        }
    }
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.  Returns `(output_string, was_truncated)`.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let truncated = &raw[..MAX_OUTPUT_BYTES];
        let mut s = String::from_utf8_lossy(truncated).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
