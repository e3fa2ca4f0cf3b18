//! Runtime configuration.
//!
//! Settings come from `config/nexus.toml` when it exists, then from the
//! environment (after `.env` has been loaded), so an exported variable always
//! wins over the file:
//!
//! | Variable                   | Field                          |
//! |----------------------------|--------------------------------|
//! | `NEXUS_DB_PATH`            | `store.db_path`                |
//! | `NEXUS_LOG_LEVEL`          | `log.level`                    |
//! | `NEXUS_PROVIDER`           | `provider.kind`                |
//! | `OPENAI_API_KEY`           | `provider.api_key`             |
//! | `NEXUS_MODEL`              | `provider.model`               |
//! | `NEXUS_BASE_URL`           | `provider.base_url`            |
//! | `NEXUS_SECONDARY_API_KEY`  | `provider.secondary_api_key`   |
//! | `NEXUS_SECONDARY_BASE_URL` | `provider.secondary_base_url`  |
//! | `NEXUS_SECONDARY_MODEL`    | `provider.secondary_model`     |
//! | `NEXUS_VISION`             | `provider.vision`              |
//! | `NEXUS_MAX_CONCURRENT`     | `scheduler.max_concurrent`     |
//! | `NEXUS_QUEUE_CAPACITY`     | `scheduler.queue_capacity`     |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use nexus_intent::llm::{DEFAULT_MODEL, OPENAI_BASE_URL};
use nexus_intent::{FallbackProvider, IntentProvider, RemoteClassifier, RemoteConfig};
use nexus_kernel::SchedulerConfig;

use crate::error::{AgentError, Result};
use crate::orchestrator::DispatcherConfig;

/// Where [`NexusConfig::load`] looks for the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/nexus.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Which classifier chain to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Offline rule classifier only.
    #[default]
    Local,
    /// OpenAI-compatible endpoint, then local rules.
    OpenAi,
    /// Primary endpoint, then a secondary endpoint, then local rules.
    Hybrid,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Hybrid => "hybrid",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "mock" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(AgentError::ConfigError {
                reason: format!("unknown provider `{other}` (expected local, openai or hybrid)"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/nexus.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Attach screenshots to vision-related requests.
    pub vision: bool,
    pub secondary_api_key: Option<String>,
    pub secondary_base_url: Option<String>,
    pub secondary_model: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Local,
            api_key: None,
            model: DEFAULT_MODEL.to_owned(),
            base_url: OPENAI_BASE_URL.to_owned(),
            vision: false,
            secondary_api_key: None,
            secondary_base_url: None,
            secondary_model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    /// Upper bound on simulated work for `general` tasks.
    pub max_work_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            max_concurrent: defaults.max_concurrent,
            queue_capacity: defaults.queue_capacity,
            max_work_secs: DispatcherConfig::default().max_work_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// NexusConfig
// ---------------------------------------------------------------------------

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    pub store: StoreSection,
    pub provider: ProviderSection,
    pub scheduler: SchedulerSection,
    pub log: LogSection,
}

impl NexusConfig {
    /// Load `.env`, then the file at `path` (usually
    /// [`DEFAULT_CONFIG_PATH`]), then environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "loaded .env");
        }
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML file.  A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml(&content).map_err(|e| AgentError::ConfigError {
            reason: format!("{}: {e}", path.display()),
        })?;

        info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to parse TOML config: {e}"),
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(v) = get("NEXUS_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("NEXUS_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = get("NEXUS_PROVIDER") {
            match v.parse() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => warn!(error = %e, "ignoring NEXUS_PROVIDER"),
            }
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = get("NEXUS_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = get("NEXUS_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = get("NEXUS_SECONDARY_API_KEY") {
            self.provider.secondary_api_key = Some(v);
        }
        if let Some(v) = get("NEXUS_SECONDARY_BASE_URL") {
            self.provider.secondary_base_url = Some(v);
        }
        if let Some(v) = get("NEXUS_SECONDARY_MODEL") {
            self.provider.secondary_model = Some(v);
        }
        if let Some(v) = get("NEXUS_VISION") {
            self.provider.vision = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(n) = get("NEXUS_MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.scheduler.max_concurrent = n;
        }
        if let Some(n) = get("NEXUS_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.scheduler.queue_capacity = n;
        }
    }

    /// Human-readable problems that do not prevent startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.provider.kind != ProviderKind::Local && !has_value(&self.provider.api_key) {
            warnings.push(format!(
                "provider `{}` selected but no API key is set; using the local classifier",
                self.provider.kind
            ));
        }
        if self.provider.kind == ProviderKind::Hybrid && !has_value(&self.provider.secondary_api_key) {
            warnings.push("hybrid provider has no secondary API key; the secondary is skipped".into());
        }
        if self.provider.vision && self.provider.kind == ProviderKind::Local {
            warnings.push("vision is enabled but the local classifier cannot use images".into());
        }
        if self.scheduler.max_concurrent == 0 {
            warnings.push("scheduler.max_concurrent is 0; using 1".into());
        }
        if self.scheduler.queue_capacity == 0 {
            warnings.push("scheduler.queue_capacity is 0; using 1".into());
        }

        warnings
    }

    /// Build the classifier chain described by `[provider]`.
    ///
    /// A remote provider without a usable key is left out of the chain, so
    /// the result always works, at worst as the local classifier alone.
    pub fn build_provider(&self) -> Arc<dyn IntentProvider> {
        let p = &self.provider;

        let primary = match p.kind {
            ProviderKind::Local => None,
            ProviderKind::OpenAi | ProviderKind::Hybrid => remote(RemoteConfig::compatible(
                "openai",
                p.api_key.clone().unwrap_or_default(),
                &p.base_url,
                &p.model,
            )
            .with_vision(p.vision)),
        };

        let secondary = match p.kind {
            ProviderKind::Hybrid => remote(RemoteConfig::compatible(
                "secondary",
                p.secondary_api_key.clone().unwrap_or_default(),
                p.secondary_base_url.clone().unwrap_or_else(|| p.base_url.clone()),
                p.secondary_model.clone().unwrap_or_else(|| p.model.clone()),
            )
            .with_vision(p.vision)),
            _ => None,
        };

        let chain = match (primary, secondary) {
            (Some(primary), Some(secondary)) => {
                FallbackProvider::new(primary).with_secondary(secondary)
            }
            (Some(only), None) | (None, Some(only)) => FallbackProvider::new(only),
            (None, None) => FallbackProvider::local_only(),
        };

        info!(kind = %p.kind, chain = ?chain.provider_names(), "intent provider ready");
        Arc::new(chain)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_max_concurrent(self.scheduler.max_concurrent)
            .with_queue_capacity(self.scheduler.queue_capacity)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_work_secs: self.scheduler.max_work_secs,
        }
    }
}

fn has_value(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn remote(config: RemoteConfig) -> Option<Arc<dyn IntentProvider>> {
    match RemoteClassifier::new(config) {
        Ok(classifier) => Some(Arc::new(classifier)),
        Err(e) => {
            warn!(error = %e, "remote classifier disabled");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
