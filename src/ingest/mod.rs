// src/ingest/mod.rs
pub mod extract;
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::feeds::TopicCatalog;
use crate::ingest::types::{FeedEntry, FeedSource, SearchApi, SearchArticle, SearchRequest};
use crate::models::{Candidate, Origin};

/// Titles at least this similar (normalized Levenshtein) are treated as one story.
pub const NEAR_DUPLICATE_TITLE: f64 = 0.92;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Candidates produced by the fetcher.");
        describe_counter!(
            "ingest_feed_errors_total",
            "Feed or search fetch/parse failures."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Candidates dropped as same-URL or near-duplicate title within one fetch."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// `clean_text`, then strip trailing sentence punctuation and lower-case.
/// Used as the comparison key for near-duplicate titles.
pub fn normalize_text(s: &str) -> String {
    let mut out = clean_text(s).to_lowercase();
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ':' | ';') {
            out.pop();
        } else {
            break;
        }
    }
    out.trim_end().to_string()
}

/// Query relevance: the query occurs in the title, or at least twice in the description.
pub fn matches_query(query: &str, title: &str, description: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    title.to_lowercase().contains(&q) || description.to_lowercase().matches(&q).count() >= 2
}

/// Drops repeated URLs and near-duplicate titles, keeping the first occurrence.
/// Returns the survivors and the number dropped.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> (Vec<Candidate>, usize) {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept_titles: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;

    for c in candidates {
        let key = normalize_text(&c.title);
        let near_dup = kept_titles
            .iter()
            .any(|t| strsim::normalized_levenshtein(t, &key) >= NEAR_DUPLICATE_TITLE);
        if near_dup || !seen_urls.insert(c.url.clone()) {
            dropped += 1;
            continue;
        }
        kept_titles.push(key);
        out.push(c);
    }
    (out, dropped)
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub per_feed_cap: usize,
    pub search_max_results: u32,
    pub max_age_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_feed_cap: 3,
            search_max_results: 10,
            max_age_days: 7,
        }
    }
}

/// Produces candidates for a topic: search API first (when a query is given),
/// then the topic's feeds.
pub struct Fetcher {
    catalog: TopicCatalog,
    feeds: Arc<dyn FeedSource>,
    search: Option<Arc<dyn SearchApi>>,
    cfg: FetchConfig,
}

impl Fetcher {
    pub fn new(catalog: TopicCatalog, feeds: Arc<dyn FeedSource>) -> Self {
        Self {
            catalog,
            feeds,
            search: None,
            cfg: FetchConfig::default(),
        }
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchApi>>) -> Self {
        self.search = search;
        self
    }

    pub fn with_config(mut self, cfg: FetchConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    pub async fn fetch(&self, topic: &str, query: Option<&str>) -> Vec<Candidate> {
        self.fetch_at(topic, query, Utc::now()).await
    }

    pub async fn fetch_at(
        &self,
        topic: &str,
        query: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        ensure_metrics_described();
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let mut raw = Vec::new();
        if let Some(q) = query {
            raw.extend(self.search_candidates(topic, q, now).await);
        }

        for feed in self.catalog.feeds_for(topic) {
            let parsed = match self.feeds.fetch_feed(feed).await {
                Ok(p) if p.valid => p,
                Ok(_) => {
                    tracing::warn!(feed = %feed.name, topic = %topic, "malformed feed skipped");
                    counter!("ingest_feed_errors_total").increment(1);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %feed.name, provider = self.feeds.name(), "feed error");
                    counter!("ingest_feed_errors_total").increment(1);
                    continue;
                }
            };

            let taken: Vec<Candidate> = parsed
                .entries
                .into_iter()
                .map(|e| feed_candidate(e, &feed.name, topic))
                .filter(|c| c.is_recent(now, self.cfg.max_age_days))
                .filter(|c| query.map_or(true, |q| matches_query(q, &c.title, &c.snippet)))
                .take(self.cfg.per_feed_cap)
                .collect();
            tracing::debug!(feed = %feed.name, kept = taken.len(), "feed read");
            raw.extend(taken);
        }

        let (out, dropped) = dedup_candidates(raw);
        counter!("ingest_dedup_total").increment(dropped as u64);
        counter!("ingest_events_total").increment(out.len() as u64);
        out
    }

    async fn search_candidates(&self, topic: &str, query: &str, now: DateTime<Utc>) -> Vec<Candidate> {
        let Some(api) = &self.search else {
            return Vec::new();
        };
        let req = SearchRequest::for_query(query, self.cfg.search_max_results, now);
        match api.search(&req).await {
            Ok(found) => found
                .into_iter()
                .filter(|a| {
                    matches_query(query, &a.title, a.description.as_deref().unwrap_or_default())
                })
                .map(|a| search_candidate(a, topic))
                .collect(),
            Err(e) => {
                tracing::warn!(error = ?e, provider = api.name(), query = %query, "search error");
                counter!("ingest_feed_errors_total").increment(1);
                Vec::new()
            }
        }
    }
}

fn feed_candidate(e: FeedEntry, feed_name: &str, topic: &str) -> Candidate {
    Candidate {
        title: e.title,
        url: e.link,
        source: feed_name.to_string(),
        topic: topic.to_string(),
        snippet: e.description.unwrap_or_default(),
        body: None,
        published_at: e.published_at,
        author: e.author,
        origin: Origin::Feed,
    }
}

fn search_candidate(a: SearchArticle, topic: &str) -> Candidate {
    Candidate {
        title: a.title,
        url: a.url,
        source: a.source_name,
        topic: topic.to_string(),
        snippet: a.description.unwrap_or_default(),
        body: a.content.filter(|c| !c.trim().is_empty()),
        published_at: a.published_at,
        author: a.author,
        origin: Origin::Search,
    }
}
