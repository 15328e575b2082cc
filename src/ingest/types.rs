// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named feed endpoint belonging to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Result of reading one feed. `valid == false` marks a malformed document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedParse {
    pub valid: bool,
    pub entries: Vec<FeedEntry>,
}

impl FeedParse {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            entries: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Transport errors surface as `Err`; parse failures as `Ok(FeedParse { valid: false, .. })`.
    async fn fetch_feed(&self, endpoint: &FeedEndpoint) -> Result<FeedParse>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub language: String,
    pub date_from: DateTime<Utc>,
    pub sort: String,
    pub page_size: u32,
}

impl SearchRequest {
    /// French articles from the last 7 days, by relevancy.
    pub fn for_query(query: &str, max_results: u32, now: DateTime<Utc>) -> Self {
        Self {
            query: query.to_string(),
            language: "fr".to_string(),
            date_from: now - chrono::Duration::days(7),
            sort: "relevancy".to_string(),
            page_size: max_results.clamp(1, 100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchArticle {
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
}

#[async_trait::async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchArticle>>;
    fn name(&self) -> &'static str;
}
