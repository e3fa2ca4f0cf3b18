//! Web search -- DuckDuckGo HTML scraping, no API key needed.
//!
//! Results are parsed out of the HTML endpoint's markup and returned as
//! [`SearchResult`] values with title, destination URL, and snippet.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::traits::{SearchResult, WebSearch};

// ═══════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════

/// Default maximum number of search results to return.
const DEFAULT_MAX_RESULTS: usize = 5;

/// DuckDuckGo HTML search endpoint.
const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Realistic browser User-Agent to avoid being blocked.
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// ═══════════════════════════════════════════════════════════════════════
//  Search client
// ═══════════════════════════════════════════════════════════════════════

/// [`WebSearch`] backed by DuckDuckGo's HTML endpoint.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Cap the number of returned results (at least 1).
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AdapterError::InvalidInput("empty search query".into()));
        }

        debug!(query, max_results = self.max_results, "performing web search");

        // POST with form data is more reliable than GET for DDG.
        let response = self
            .client
            .post(DUCKDUCKGO_HTML_URL)
            .form(&[("q", query), ("kl", ""), ("df", "")])
            .send()
            .await
            .map_err(|e| AdapterError::http("web search", e))?;

        if !response.status().is_success() {
            return Err(AdapterError::http(
                "web search",
                format!("DuckDuckGo returned status {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AdapterError::http("web search", e))?;

        let results = parse_duckduckgo_results(&html, self.max_results);
        debug!(count = results.len(), engine = "duckduckgo", "search completed");
        Ok(results)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  DuckDuckGo HTML parsing
// ═══════════════════════════════════════════════════════════════════════

fn parse_duckduckgo_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let title_marker = "class=\"result__a\"";
    let snippet_marker = "class=\"result__snippet\"";

    let title_positions: Vec<usize> = html.match_indices(title_marker).map(|(i, _)| i).collect();
    let snippet_positions: Vec<usize> =
        html.match_indices(snippet_marker).map(|(i, _)| i).collect();

    let mut results = Vec::new();
    for (i, &title_pos) in title_positions.iter().enumerate() {
        if results.len() >= max_results {
            break;
        }

        let url = extract_href_before(&html[..title_pos]).unwrap_or_default();
        let url = clean_ddg_url(&url);

        let title = strip_html_tags(&extract_tag_text(
            &html[title_pos + title_marker.len()..],
            "</a>",
        ));

        let snippet = snippet_positions
            .get(i)
            .map(|&pos| {
                let raw = extract_tag_text(&html[pos + snippet_marker.len()..], "</a>");
                strip_html_tags(&raw).trim().to_string()
            })
            .unwrap_or_default();

        if !title.is_empty() || !url.is_empty() {
            results.push(SearchResult {
                title: title.trim().to_string(),
                url,
                snippet,
            });
        }
    }

    results
}

/// Clean DuckDuckGo tracking URLs to extract the actual destination URL.
fn clean_ddg_url(raw: &str) -> String {
    let absolute = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };

    if absolute.contains("duckduckgo.com/l/")
        && let Ok(parsed) = url::Url::parse(&absolute)
        && let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg")
    {
        return target.into_owned();
    }
    absolute
}

fn extract_href_before(html_before: &str) -> Option<String> {
    let href_marker = "href=\"";
    let last_href = html_before.rfind(href_marker)?;
    let remaining = &html_before[last_href + href_marker.len()..];
    let end = remaining.find('"')?;
    Some(remaining[..end].to_string())
}

fn extract_tag_text(html_after_marker: &str, end_marker: &str) -> String {
    let Some(closing_bracket) = html_after_marker.find('>') else {
        return String::new();
    };
    let content = &html_after_marker[closing_bracket + 1..];
    let end = content.find(end_marker).unwrap_or(content.len());
    content[..end].to_string()
}

/// Strip HTML tags from a string and decode common HTML entities.
pub fn strip_html_tags(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut inside_tag = false;

    for ch in input.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            _ if !inside_tag => result.push(ch),
            _ => {}
        }
    }

    result
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
