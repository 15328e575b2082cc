// src/ingest/extract.rs
//! Article body extraction from a page's HTML.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::ingest::providers::rss::BROWSER_USER_AGENT;

/// Tried in order; the first selector yielding non-empty visible text wins.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "div.article__content",
    "div.content",
    "div#content",
    "[itemprop=\"articleBody\"]",
];

static SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                tracing::warn!("Failed to parse selector '{}': {}", s, e);
                None
            }
        })
        .collect()
});

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Main body text of the page at `url`, `""` when nothing usable was found.
    async fn extract(&self, url: &str) -> Result<String>;
}

/// Visible text of `el` (script/style/noscript subtrees skipped), whitespace-collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if !hidden {
            let t = text.trim();
            if !t.is_empty() {
                parts.push(t);
            }
        }
    }
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Picks the main content container of `html` and returns its visible text.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);
    for sel in SELECTORS.iter() {
        if let Some(text) = document
            .select(sel)
            .map(visible_text)
            .find(|t| !t.is_empty())
        {
            return text;
        }
    }
    String::new()
}

/// Fetches pages over HTTP. Every failure degrades to an empty body.
pub struct HttpExtractor {
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("building extractor http client")?;
        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        resp.text().await.context("extractor .text()")
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        match self.fetch_html(url).await {
            Ok(html) => {
                let text = extract_main_text(&html);
                if text.is_empty() {
                    tracing::debug!(url = %url, "no content container matched");
                }
                Ok(text)
            }
            Err(e) => {
                tracing::warn!(error = ?e, url = %url, "content extraction failed");
                Ok(String::new())
            }
        }
    }
}

/// Canned bodies keyed by URL; unknown URLs extract to `""`.
#[derive(Debug, Default, Clone)]
pub struct StaticExtractor {
    pages: HashMap<String, String>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl ContentExtractor for StaticExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }
}
