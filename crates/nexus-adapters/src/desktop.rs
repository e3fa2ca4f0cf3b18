//! Desktop actuator and screen capture.
//!
//! Each action is translated into a platform-specific [`Invocation`]
//! (`xdotool` and friends on Linux, AppleScript on macOS, PowerShell and
//! `winget` on Windows) and run without a shell.  Expected failures come
//! back as [`ActionOutcome::Failure`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};
use crate::platform::{Invocation, Platform, applescript_quote, ps_quote};
use crate::traits::{ActionOutcome, Actuator, ScreenCapture};

/// Timeout for quick interactive actions.
const ACTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Package managers can take a while.
const PACKAGE_TIMEOUT: Duration = Duration::from_secs(600);

// ═══════════════════════════════════════════════════════════════════════
//  Invocation builders
// ═══════════════════════════════════════════════════════════════════════

/// Common application names mapped to Linux binaries.
fn linux_binary(app: &str) -> &str {
    match app {
        "notepad" | "editor" => "gedit",
        "chrome" => "google-chrome",
        "calculator" | "calc" => "gnome-calculator",
        "terminal" => "x-terminal-emulator",
        "files" | "explorer" => "nautilus",
        other => other,
    }
}

fn open_invocation(platform: Platform, app: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new(linux_binary(app), Vec::<String>::new())),
        Platform::MacOs => Some(Invocation::new("open", ["-a", app])),
        Platform::Windows => Some(Invocation::powershell(format!(
            "Start-Process '{}' -ErrorAction Stop",
            ps_quote(app)
        ))),
        Platform::Other => None,
    }
}

fn type_invocation(platform: Platform, text: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("xdotool", ["type", "--delay", "50", "--", text])),
        Platform::MacOs => Some(Invocation::osascript(format!(
            "tell application \"System Events\" to keystroke \"{}\"",
            applescript_quote(text)
        ))),
        Platform::Windows => Some(Invocation::powershell(format!(
            "Add-Type -AssemblyName System.Windows.Forms; \
             [System.Windows.Forms.SendKeys]::SendWait('{}')",
            ps_quote(&sendkeys_escape(text))
        ))),
        Platform::Other => None,
    }
}

fn press_invocation(platform: Platform, key: &str) -> Option<Invocation> {
    let key = key.trim().to_lowercase();
    match platform {
        Platform::Linux => {
            let name = match key.as_str() {
                "enter" => "Return".to_string(),
                "esc" | "escape" => "Escape".to_string(),
                "tab" => "Tab".to_string(),
                "space" => "space".to_string(),
                "backspace" => "BackSpace".to_string(),
                other => other.to_string(),
            };
            Some(Invocation::new("xdotool", ["key".to_string(), name]))
        }
        Platform::MacOs => {
            let script = match mac_key_code(&key) {
                Some(code) => format!("tell application \"System Events\" to key code {code}"),
                None => format!(
                    "tell application \"System Events\" to keystroke \"{}\"",
                    applescript_quote(&key)
                ),
            };
            Some(Invocation::osascript(script))
        }
        Platform::Windows => {
            let token = if key.chars().count() == 1 {
                sendkeys_escape(&key)
            } else {
                format!("{{{}}}", key.to_uppercase())
            };
            Some(Invocation::powershell(format!(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 [System.Windows.Forms.SendKeys]::SendWait('{}')",
                ps_quote(&token)
            )))
        }
        Platform::Other => None,
    }
}

fn mac_key_code(key: &str) -> Option<u8> {
    match key {
        "enter" | "return" => Some(36),
        "tab" => Some(48),
        "space" => Some(49),
        "backspace" | "delete" => Some(51),
        "esc" | "escape" => Some(53),
        _ => None,
    }
}

/// Escape characters that SendKeys treats as modifiers or groups.
fn sendkeys_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '+' | '^' | '%' | '~' | '(' | ')' | '[' | ']' | '{' | '}' => {
                out.push('{');
                out.push(ch);
                out.push('}');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn close_invocation(platform: Platform, app: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("pkill", ["-x", linux_binary(app)])),
        Platform::MacOs => Some(Invocation::osascript(format!(
            "quit app \"{}\"",
            applescript_quote(app)
        ))),
        Platform::Windows => {
            let image = if app.to_lowercase().ends_with(".exe") {
                app.to_string()
            } else {
                format!("{app}.exe")
            };
            Some(Invocation::new("taskkill", ["/IM".to_string(), image, "/F".to_string()]))
        }
        Platform::Other => None,
    }
}

fn install_invocation(platform: Platform, app: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("apt-get", ["install", "-y", app])),
        Platform::MacOs => Some(Invocation::new("brew", ["install", app])),
        Platform::Windows => Some(Invocation::new(
            "winget",
            [
                "install",
                "-e",
                "--id",
                app,
                "--accept-source-agreements",
                "--accept-package-agreements",
            ],
        )),
        Platform::Other => None,
    }
}

fn uninstall_invocation(platform: Platform, app: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("apt-get", ["remove", "-y", app])),
        Platform::MacOs => Some(Invocation::new("brew", ["uninstall", app])),
        Platform::Windows => Some(Invocation::new("winget", ["uninstall", "-e", "--id", app])),
        Platform::Other => None,
    }
}

fn notify_invocation(platform: Platform, title: &str, message: &str) -> Option<Invocation> {
    match platform {
        Platform::Linux => Some(Invocation::new("notify-send", [title, message])),
        Platform::MacOs => Some(Invocation::osascript(format!(
            "display notification \"{}\" with title \"{}\"",
            applescript_quote(message),
            applescript_quote(title)
        ))),
        Platform::Windows => Some(Invocation::powershell(format!(
            "Add-Type -AssemblyName PresentationFramework; \
             [System.Windows.MessageBox]::Show('{}', '{}')",
            ps_quote(message),
            ps_quote(title)
        ))),
        Platform::Other => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Actuator
// ═══════════════════════════════════════════════════════════════════════

/// [`Actuator`] that drives the local desktop.
#[derive(Debug, Clone)]
pub struct DesktopActuator {
    platform: Platform,
}

impl Default for DesktopActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopActuator {
    pub fn new() -> Self {
        Self::for_platform(Platform::current())
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self { platform }
    }

    fn unsupported(&self, action: &str) -> ActionOutcome {
        ActionOutcome::failure(format!(
            "{action} is not supported on {}",
            self.platform.name()
        ))
    }

    /// Run `invocation` and map its exit status to an outcome.
    async fn perform(
        &self,
        action: &str,
        invocation: Option<Invocation>,
        timeout: Duration,
        success: String,
    ) -> ActionOutcome {
        let Some(invocation) = invocation else {
            return self.unsupported(action);
        };

        match invocation.run(timeout).await {
            Ok(out) if out.success() && out.stderr.is_empty() => ActionOutcome::Success(success),
            Ok(out) if out.success() => {
                debug!(action, stderr = %out.stderr, "action succeeded with diagnostics");
                ActionOutcome::Success(success)
            }
            Ok(out) => {
                let reason = if out.stderr.is_empty() {
                    format!("{} exited with code {}", invocation.program, out.exit_code)
                } else {
                    out.stderr
                };
                warn!(action, %reason, "action failed");
                ActionOutcome::Failure(reason)
            }
            Err(e) => {
                warn!(action, error = %e, "action failed");
                ActionOutcome::Failure(e.to_string())
            }
        }
    }
}

fn require(value: &str, what: &str) -> std::result::Result<String, ActionOutcome> {
    let value = value.trim();
    if value.is_empty() {
        Err(ActionOutcome::failure(format!("no {what} given")))
    } else {
        Ok(value.to_string())
    }
}

#[async_trait]
impl Actuator for DesktopActuator {
    async fn open(&self, app: &str) -> ActionOutcome {
        let app = match require(app, "application") {
            Ok(app) => app,
            Err(outcome) => return outcome,
        };

        // Linux launchers stay attached to the process; start detached and
        // treat a failed spawn as "not found".
        if self.platform == Platform::Linux {
            return match open_invocation(self.platform, &app).map(|i| i.spawn_detached()) {
                Some(Ok(())) => ActionOutcome::Success(format!("Opened {app}")),
                Some(Err(e)) => ActionOutcome::Failure(format!("cannot open {app}: {e}")),
                None => self.unsupported("open"),
            };
        }

        let invocation = open_invocation(self.platform, &app);
        self.perform("open", invocation, ACTION_TIMEOUT, format!("Opened {app}"))
            .await
    }

    async fn type_text(&self, text: &str) -> ActionOutcome {
        if text.is_empty() {
            return ActionOutcome::failure("no text given");
        }
        // Give the target window a moment to take focus.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let invocation = type_invocation(self.platform, text);
        self.perform("type", invocation, ACTION_TIMEOUT, format!("Typed: {text}"))
            .await
    }

    async fn press(&self, key: &str) -> ActionOutcome {
        let key = match require(key, "key") {
            Ok(key) => key,
            Err(outcome) => return outcome,
        };
        let invocation = press_invocation(self.platform, &key);
        self.perform("press", invocation, ACTION_TIMEOUT, format!("Pressed: {key}"))
            .await
    }

    async fn close(&self, app: &str) -> ActionOutcome {
        let app = match require(app, "application") {
            Ok(app) => app,
            Err(outcome) => return outcome,
        };
        let invocation = close_invocation(self.platform, &app);
        self.perform("close", invocation, ACTION_TIMEOUT, format!("Closed {app}"))
            .await
    }

    async fn install(&self, app: &str) -> ActionOutcome {
        let app = match require(app, "application") {
            Ok(app) => app,
            Err(outcome) => return outcome,
        };
        let invocation = install_invocation(self.platform, &app);
        self.perform("install", invocation, PACKAGE_TIMEOUT, format!("Installed {app}"))
            .await
    }

    async fn uninstall(&self, app: &str) -> ActionOutcome {
        let app = match require(app, "application") {
            Ok(app) => app,
            Err(outcome) => return outcome,
        };
        let invocation = uninstall_invocation(self.platform, &app);
        self.perform(
            "uninstall",
            invocation,
            PACKAGE_TIMEOUT,
            format!("Uninstalled {app}"),
        )
        .await
    }

    async fn notify(&self, title: &str, message: &str) -> ActionOutcome {
        // Message boxes block until dismissed; never wait on them.
        match notify_invocation(self.platform, title, message).map(|i| i.spawn_detached()) {
            Some(Ok(())) => ActionOutcome::success("Notification sent"),
            Some(Err(e)) => ActionOutcome::Failure(format!("failed to show notification: {e}")),
            None => self.unsupported("notify"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Screen capture
// ═══════════════════════════════════════════════════════════════════════

/// [`ScreenCapture`] using the platform screenshot tool.
///
/// Linux uses ImageMagick's `import`, macOS `screencapture`.  Other
/// platforms report no image.
#[derive(Debug, Clone)]
pub struct DesktopCapture {
    platform: Platform,
}

impl Default for DesktopCapture {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
        }
    }
}

impl DesktopCapture {
    pub fn new() -> Self {
        Self::default()
    }

    async fn capture_stdout(program: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = tokio::time::timeout(
            ACTION_TIMEOUT,
            tokio::process::Command::new(program)
                .args(args)
                .stdin(std::process::Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AdapterError::Timeout {
            seconds: ACTION_TIMEOUT.as_secs(),
            reason: "screen capture did not finish".into(),
        })??;

        if !output.status.success() {
            return Err(AdapterError::ExecutionFailed {
                operation: "screen capture".into(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ScreenCapture for DesktopCapture {
    async fn capture(&self) -> Result<Option<Vec<u8>>> {
        let bytes = match self.platform {
            Platform::Linux => Self::capture_stdout("import", &["-window", "root", "png:-"]).await?,
            Platform::MacOs => {
                let path = std::env::temp_dir().join(format!("nexus-{}.png", uuid::Uuid::now_v7()));
                let path_str = path.to_string_lossy().into_owned();
                Self::capture_stdout("screencapture", &["-x", "-t", "png", &path_str]).await?;
                let bytes = tokio::fs::read(&path).await?;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(error = %e, "could not remove screenshot file");
                }
                bytes
            }
            Platform::Windows | Platform::Other => return Ok(None),
        };

        Ok((!bytes.is_empty()).then_some(bytes))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
