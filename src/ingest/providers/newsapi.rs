// src/ingest/providers/newsapi.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::clean_text;
use crate::ingest::types::{SearchApi, SearchArticle, SearchRequest};

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    source: ApiSource,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    name: Option<String>,
}

/// NewsAPI `/v2/everything` client.
pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building newsapi http client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: NEWSAPI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Maps a raw `/v2/everything` body to search articles. Entries without a
/// title or URL, and NewsAPI's "[Removed]" placeholders, are dropped.
pub fn parse_everything(body: &str) -> Result<Vec<SearchArticle>> {
    let resp: EverythingResponse = serde_json::from_str(body).context("parsing newsapi json")?;
    if resp.status != "ok" {
        return Err(anyhow!(
            "newsapi error: {}",
            resp.message.unwrap_or_else(|| resp.status.clone())
        ));
    }
    let out = resp
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = clean_text(a.title.as_deref()?);
            let url = a.url?.trim().to_string();
            if title.is_empty() || url.is_empty() || title == "[Removed]" {
                return None;
            }
            Some(SearchArticle {
                title,
                url,
                source_name: a.source.name.unwrap_or_else(|| "NewsAPI".to_string()),
                published_at: a
                    .published_at
                    .as_deref()
                    .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
                    .map(|d| d.with_timezone(&Utc)),
                description: a.description.map(|d| clean_text(&d)),
                content: a.content,
                author: a.author.filter(|s| !s.trim().is_empty()),
            })
        })
        .collect();
    Ok(out)
}

#[async_trait]
impl SearchApi for NewsApiClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchArticle>> {
        let from = request.date_from.format("%Y-%m-%d").to_string();
        let page_size = request.page_size.to_string();
        let body = self
            .client
            .get(&self.base_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", request.query.as_str()),
                ("language", request.language.as_str()),
                ("from", from.as_str()),
                ("sortBy", request.sort.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .context("newsapi request")?
            .text()
            .await
            .context("newsapi .text()")?;
        parse_everything(&body)
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}
