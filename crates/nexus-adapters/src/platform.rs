//! Host platform detection and external program invocation.
//!
//! The desktop actuator and the browser opener build an [`Invocation`] per
//! platform and run it here, without going through a shell.

use std::time::Duration;

use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::traits::CommandOutput;

/// Operating system family the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// Detect the platform of the running process.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other => std::env::consts::OS,
        }
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A PowerShell one-liner.
    pub fn powershell(script: impl Into<String>) -> Self {
        Self::new("powershell", ["-NoProfile".to_string(), "-Command".to_string(), script.into()])
    }

    /// An AppleScript one-liner.
    pub fn osascript(script: impl Into<String>) -> Self {
        Self::new("osascript", ["-e".to_string(), script.into()])
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run to completion and capture output.
    pub async fn run(&self, timeout: Duration) -> Result<CommandOutput> {
        debug!(program = %self.program, args = ?self.args, "running program");

        let child = self
            .command()
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout {
                seconds: timeout.as_secs(),
                reason: format!("`{}` did not finish", self.program),
            })??;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Start the program and return without waiting for it.
    pub fn spawn_detached(&self) -> Result<()> {
        debug!(program = %self.program, args = ?self.args, "spawning program");
        self.command()
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        Ok(())
    }
}

/// The platform's "open this URL or file" invocation.
pub fn opener(platform: Platform, target: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("xdg-open", [target])),
        Platform::MacOs => Some(Invocation::new("open", [target])),
        Platform::Windows => Some(Invocation::new("cmd", ["/C", "start", "", target])),
        Platform::Other => None,
    }
}

/// Escape for a single-quoted PowerShell string.
pub(crate) fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}

/// Escape for a double-quoted AppleScript string.
pub(crate) fn applescript_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_per_platform() {
        let linux = opener(Platform::Linux, "https://example.org").unwrap();
        assert_eq!(linux.program, "xdg-open");
        assert_eq!(linux.args, vec!["https://example.org"]);

        let windows = opener(Platform::Windows, "https://example.org").unwrap();
        assert_eq!(windows.program, "cmd");
        assert_eq!(windows.args.last().map(String::as_str), Some("https://example.org"));

        assert!(opener(Platform::Other, "x").is_none());
    }

    #[test]
    fn quoting_helpers() {
        assert_eq!(ps_quote("it's"), "it''s");
        assert_eq!(applescript_quote(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_output_and_exit_code() {
        let out = Invocation::new("sh", ["-c", "echo out; echo err 1>&2; exit 4"])
            .run(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
        assert_eq!(out.exit_code, 4);
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let err = Invocation::new("nexus-definitely-not-a-program", Vec::<String>::new())
            .run(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::IoError(_)));
    }
}
