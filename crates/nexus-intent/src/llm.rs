//! Remote classifier over an OpenAI-compatible Chat Completions endpoint.
//!
//! The model is asked for a JSON document describing the tasks.  The reply
//! may be a bare array, an object with a `tasks` array, or a single task
//! object, optionally wrapped in a markdown code fence.  Each entry's
//! `metadata` is decoded through [`TaskMetadata::from_value`], so unknown
//! task types degrade to `general` instead of failing the whole reply.
//!
//! With vision enabled, a screenshot is attached as a base64 data URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use nexus_kernel::{TaskDescriptor, TaskMetadata};

use crate::error::{IntentError, Result};
use crate::provider::IntentProvider;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for classification.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str = r#"You are Nexus, a casual and friendly desktop assistant. Split the user's command into independent tasks.

Task types (the metadata object always carries "type"):
1. gui_automation: {"action": "open", "app": "..."} opens an application
2. gui_automation: {"action": "close", "app": "..."} closes an application
3. gui_automation: {"action": "type", "text": "..."} types text
4. gui_automation: {"action": "press", "key": "..."} presses a key
5. gui_automation: {"action": "install", "app": "..."} installs an application
6. gui_automation: {"action": "uninstall", "app": "..."} uninstalls an application
7. web_search: {"query": "..."} searches the web; add "song" to the query for music
8. reminder: {"message": "..."} reminds the user
9. shell: {"command": "..."} runs a system command when no other type fits
10. response: {"text": "..."} replies to the user; use for chat, greetings and questions
11. general: {"duration": seconds} generic work

Scheduling: when the user gives a delay ("in 5 minutes", "after 10 seconds"), add "scheduled_delay_seconds" to the metadata.

If an image is attached and the user asks what is on the screen, answer with a response task whose text describes the image.

Reply ONLY with JSON of the form:
{"tasks": [{"description": "Open Chrome", "metadata": {"type": "gui_automation", "action": "open", "app": "chrome"}}]}"#;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Name used in logs (e.g. `openai`, `secondary`).
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Attach screenshots to requests.
    pub vision: bool,
}

impl RemoteConfig {
    /// The public OpenAI endpoint with the default model.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".into(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            vision: false,
        }
    }

    /// Any OpenAI-compatible endpoint.
    pub fn compatible(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            vision: false,
        }
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// [`IntentProvider`] backed by a remote chat model.
#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteClassifier {
    /// Create a classifier.  Fails when the API key is empty.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(IntentError::MissingApiKey {
                provider: config.name,
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| IntentError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Build the Chat Completions request body.
    fn build_request_body(&self, utterance: &str, image: Option<&[u8]>) -> Value {
        let mut content = vec![json!({
            "type": "text",
            "text": format!("Parse this command: {utterance}"),
        })];

        if self.config.vision
            && let Some(bytes) = image
        {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", BASE64.encode(bytes)) },
            }));
        }

        json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
        })
    }

    async fn send(&self, body: &Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| IntentError::RequestFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(url = %url, model = %self.config.model, provider = %self.config.name, "sending classification request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| IntentError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| IntentError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(IntentError::RequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl IntentProvider for RemoteClassifier {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_vision(&self) -> bool {
        self.config.vision
    }

    async fn analyze(&self, utterance: &str, image: Option<&[u8]>) -> Result<Vec<TaskDescriptor>> {
        let body = self.build_request_body(utterance, image);
        let raw = self.send(&body).await?;

        let envelope: Value = serde_json::from_str(&raw).map_err(|e| IntentError::ParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;
        let content = completion_content(&envelope)?;

        let tasks = parse_task_documents(content)?;
        if tasks.is_empty() {
            return Err(IntentError::EmptyClassification {
                provider: self.config.name.clone(),
            });
        }

        debug!(provider = %self.config.name, count = tasks.len(), "remote classification complete");
        Ok(tasks)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Pull `choices[0].message.content` out of a completion envelope.
fn completion_content(envelope: &Value) -> Result<&str> {
    envelope["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| IntentError::ParseFailed {
            reason: "missing `choices[0].message.content` in response".into(),
        })
}

/// Decode the model's task document into descriptors.
///
/// Entries that are not objects are skipped.  A missing description falls
/// back to the metadata's `type`.
pub fn parse_task_documents(content: &str) -> Result<Vec<TaskDescriptor>> {
    let cleaned = content.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(IntentError::ParseFailed {
            reason: "empty response".into(),
        });
    }

    let doc: Value = serde_json::from_str(cleaned).map_err(|e| IntentError::ParseFailed {
        reason: format!("invalid JSON: {e}"),
    })?;

    let entries = match doc {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tasks") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(IntentError::ParseFailed {
                    reason: format!("`tasks` is not an array: {other}"),
                });
            }
            None => vec![Value::Object(obj)],
        },
        other => {
            return Err(IntentError::ParseFailed {
                reason: format!("expected an array or object, got {other}"),
            });
        }
    };

    Ok(entries.into_iter().filter_map(descriptor_from_entry).collect())
}

fn descriptor_from_entry(entry: Value) -> Option<TaskDescriptor> {
    let Value::Object(mut obj) = entry else {
        return None;
    };

    let metadata = TaskMetadata::from_value(obj.remove("metadata").unwrap_or(Value::Null));
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(|| metadata.kind.type_name().to_owned(), str::to_owned);

    Some(TaskDescriptor {
        description,
        metadata,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
