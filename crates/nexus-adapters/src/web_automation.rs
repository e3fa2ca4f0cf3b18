//! Browser automation -- open URLs and play the first YouTube hit for a
//! query.
//!
//! `search_and_play` fetches the YouTube results page, pulls the first
//! `"videoId"` out of the embedded JSON, and opens the watch URL in the
//! default browser.  When no id can be found it opens the results page
//! itself.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{AdapterError, Result};
use crate::platform::{Platform, opener};
use crate::traits::WebAutomation;
use crate::web_search::BROWSER_USER_AGENT;

const YOUTUBE_RESULTS_URL: &str = "https://www.youtube.com/results";
const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""videoId":"([^"]+)""#).expect("videoId pattern is a valid regex")
});

/// [`WebAutomation`] backed by YouTube search and the system browser.
#[derive(Debug, Clone)]
pub struct YouTubeAutomation {
    client: reqwest::Client,
    platform: Platform,
}

impl Default for YouTubeAutomation {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeAutomation {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            platform: Platform::current(),
        }
    }

    fn open_in_browser(&self, url: &str) -> Result<()> {
        let invocation = opener(self.platform, url).ok_or_else(|| AdapterError::Unsupported {
            platform: self.platform.name(),
            operation: "open url".into(),
        })?;
        invocation.spawn_detached()
    }
}

/// The YouTube results page URL for `query`.
pub fn results_url(query: &str) -> Result<url::Url> {
    url::Url::parse_with_params(YOUTUBE_RESULTS_URL, &[("search_query", query)])
        .map_err(|e| AdapterError::InvalidInput(format!("bad query `{query}`: {e}")))
}

/// The watch URL of the first video id in a results page, if any.
pub fn first_video_url(html: &str) -> Option<String> {
    VIDEO_ID
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|id| format!("{YOUTUBE_WATCH_URL}?v={}", id.as_str()))
}

#[async_trait]
impl WebAutomation for YouTubeAutomation {
    async fn search_and_play(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AdapterError::InvalidInput("empty media query".into()));
        }

        let search_url = results_url(query)?;
        debug!(query, url = %search_url, "searching youtube");

        let response = self
            .client
            .get(search_url.clone())
            .send()
            .await
            .map_err(|e| AdapterError::http("youtube search", e))?;

        if !response.status().is_success() {
            return Err(AdapterError::http(
                "youtube search",
                format!("status {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AdapterError::http("youtube search", e))?;

        match first_video_url(&html) {
            Some(video_url) => {
                info!(query, url = %video_url, "playing first result");
                self.open_in_browser(&video_url)?;
            }
            None => {
                info!(query, "no video id found; opening results page");
                self.open_in_browser(search_url.as_str())?;
            }
        }

        Ok(format!("Playing: {query}"))
    }

    async fn open_url(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|e| AdapterError::InvalidInput(format!("bad url `{url}`: {e}")))?;
        self.open_in_browser(parsed.as_str())?;
        info!(url = %parsed, "opened url");
        Ok(format!("Opened {parsed}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
