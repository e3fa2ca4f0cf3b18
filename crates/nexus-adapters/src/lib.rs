//! Collaborators for Nexus -- desktop actuator, shell, web search, browser
//! automation, screen capture.
//!
//! The dispatcher depends only on the contracts in [`traits`].  The other
//! modules hold the default implementations the `nexus` binary wires in.

pub mod desktop;
pub mod error;
pub mod platform;
pub mod shell;
pub mod traits;
pub mod web_automation;
pub mod web_search;

pub use desktop::{DesktopActuator, DesktopCapture};
pub use error::{AdapterError, Result};
pub use platform::{Invocation, Platform};
pub use shell::SystemShell;
pub use traits::{
    ActionOutcome, Actuator, CommandOutput, ScreenCapture, SearchResult, ShellRunner,
    WebAutomation, WebSearch,
};
pub use web_automation::YouTubeAutomation;
pub use web_search::DuckDuckGoSearch;
