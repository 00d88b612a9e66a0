//! Keyword lookup over the Contabilizei home page
//!
//! Fetches one fixed page, flattens it to text and returns the sentences that
//! share at least one word with the query. Grounding context for the intent
//! classifier; a failed fetch degrades to "nothing found" instead of an error.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, WorkflowError};

pub const DEFAULT_SOURCE_URL: &str = "https://www.contabilizei.com.br";

/// Desktop Chrome user agent; the site serves a stripped page to unknown agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Returned when no sentence shares a word with the query
pub const NOTHING_FOUND: &str = "No relevant information found on the website.";

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));
static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

/// Source of grounding excerpts for a query.
///
/// Implementations never fail; an unavailable source yields [`NOTHING_FOUND`].
#[async_trait]
pub trait ExcerptSource: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

/// Settings for [`ContentLookup`]
#[derive(Debug, Clone)]
pub struct LookupSettings {
    pub url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Fetch-and-grep over a single reference page. No caching.
#[derive(Debug)]
pub struct ContentLookup {
    client: Client,
    url: Url,
}

impl ContentLookup {
    pub fn new(settings: &LookupSettings) -> Result<Self> {
        let url = Url::parse(&settings.url).map_err(|e| {
            WorkflowError::Configuration(format!("invalid lookup url '{}': {e}", settings.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WorkflowError::Configuration(format!(
                "lookup url must be http(s), got '{}'",
                url.scheme()
            )));
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .build()
            .map_err(|e| WorkflowError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    /// Return the sentences of the reference page relevant to `query`,
    /// newline-joined, or [`NOTHING_FOUND`].
    pub async fn search(&self, query: &str) -> String {
        let html = match self.fetch_page().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Content lookup fetch failed, continuing without excerpt: {}", e);
                String::new()
            }
        };

        let text = extract_text(&html);
        debug!("Extracted {} chars of page text from {}", text.len(), self.url);
        search_text(&text, query)
    }

    async fn fetch_page(&self) -> Result<String> {
        debug!("Fetching reference page {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| WorkflowError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::Fetch(format!("{} returned status {}", self.url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| WorkflowError::Fetch(format!("failed to read body: {e}")))
    }
}

#[async_trait]
impl ExcerptSource for ContentLookup {
    async fn search(&self, query: &str) -> String {
        ContentLookup::search(self, query).await
    }
}

/// Flatten an HTML document to one line of visible text.
///
/// Script and style contents are dropped; each line is trimmed and split on
/// double spaces, and the non-empty chunks are joined with single spaces.
pub fn extract_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keyword search over flat text. See [`ContentLookup::search`].
pub fn search_text(text: &str, query: &str) -> String {
    let matches = matching_sentences(text, query);
    if matches.is_empty() {
        NOTHING_FOUND.to_string()
    } else {
        matches.join("\n")
    }
}

fn matching_sentences<'a>(text: &'a str, query: &str) -> Vec<&'a str> {
    let query_words = tokenize(query);
    if query_words.is_empty() {
        return Vec::new();
    }

    SENTENCE_END_RE
        .split(text)
        .filter(|sentence| !tokenize(sentence).is_disjoint(&query_words))
        .map(str::trim)
        .collect()
}

fn tokenize(s: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
