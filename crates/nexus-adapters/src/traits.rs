//! Collaborator contracts.
//!
//! The dispatcher never talks to the operating system or the network
//! directly.  Every side effect goes through one of the traits below, which
//! are injected as trait objects at construction time so tests can swap in
//! recording mocks.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Result of an actuator call.
///
/// Expected failures (an application that does not exist, a key that cannot
/// be pressed) are reported as [`ActionOutcome::Failure`] rather than as an
/// error, so the dispatcher can decide on a recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action happened; carries a human-readable confirmation.
    Success(String),
    /// The action could not be performed; carries the reason.
    Failure(String),
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success(message.into())
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The confirmation or failure reason.
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Failure(m) => m,
        }
    }

    /// Convert into a `Result`, keeping the message on either side.
    pub fn into_result(self) -> std::result::Result<String, String> {
        match self {
            Self::Success(m) => Ok(m),
            Self::Failure(m) => Err(m),
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(m) => write!(f, "ok: {m}"),
            Self::Failure(m) => write!(f, "failed: {m}"),
        }
    }
}

/// Captured output of a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Drives desktop applications and user notifications.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Launch an application by name.
    async fn open(&self, app: &str) -> ActionOutcome;

    /// Type text into the focused window.
    async fn type_text(&self, text: &str) -> ActionOutcome;

    /// Press a single key.
    async fn press(&self, key: &str) -> ActionOutcome;

    /// Terminate a running application.
    async fn close(&self, app: &str) -> ActionOutcome;

    /// Install an application through the platform package manager.
    async fn install(&self, app: &str) -> ActionOutcome;

    /// Remove an application through the platform package manager.
    async fn uninstall(&self, app: &str) -> ActionOutcome;

    /// Show a notification to the user.
    async fn notify(&self, title: &str, message: &str) -> ActionOutcome;
}

/// Runs system commands.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run `command` through the system shell and capture its output.
    ///
    /// A non-zero exit code is not an error; it is reported in
    /// [`CommandOutput::exit_code`].
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Searches the web.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Ordered search hits for `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Browser-level automation.
#[async_trait]
pub trait WebAutomation: Send + Sync {
    /// Find the first media result for `query` and start playing it.
    async fn search_and_play(&self, query: &str) -> Result<String>;

    /// Open `url` in the default browser.
    async fn open_url(&self, url: &str) -> Result<String>;
}

/// Grabs the current screen contents.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// PNG bytes of the screen, or `None` when capture is unavailable.
    async fn capture(&self) -> Result<Option<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        let ok = ActionOutcome::success("Opened notepad");
        assert!(ok.is_success());
        assert_eq!(ok.message(), "Opened notepad");
        assert_eq!(ok.clone().into_result(), Ok("Opened notepad".to_string()));

        let bad = ActionOutcome::failure("no such app");
        assert!(!bad.is_success());
        assert_eq!(bad.into_result(), Err("no such app".to_string()));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ActionOutcome::failure("nope")).unwrap();
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn command_output_success_tracks_exit_code() {
        let out = CommandOutput {
            stdout: "hi".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(out.success());
        assert!(!CommandOutput {
            exit_code: 2,
            ..out
        }
        .success());
    }
}
