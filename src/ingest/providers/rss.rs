// src/ingest/providers/rss.rs
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::clean_text;
use crate::ingest::types::{FeedEndpoint, FeedEntry, FeedParse, FeedSource};

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

/// Parses an RSS 2.0 or Atom document. Anything else, or a document that fails
/// to deserialize, yields `FeedParse::invalid()`.
pub fn parse_feed(xml: &str) -> FeedParse {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let head: String = xml_clean.chars().take(2048).collect::<String>().to_lowercase();

    let parsed = if head.contains("<rss") {
        parse_rss(&xml_clean)
    } else if head.contains("<feed") {
        parse_atom(&xml_clean)
    } else {
        Err(anyhow::anyhow!("not an RSS or Atom document"))
    };

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match parsed {
        Ok(entries) => FeedParse {
            valid: true,
            entries,
        },
        Err(e) => {
            tracing::debug!(error = ?e, "feed parse failed");
            FeedParse::invalid()
        }
    }
}

fn parse_rss(xml: &str) -> Result<Vec<FeedEntry>> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let (Some(title), Some(link)) = (non_empty(it.title), non_empty(it.link)) else {
            continue;
        };
        out.push(FeedEntry {
            title,
            link,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            author: non_empty(it.author),
            description: non_empty(it.description),
        });
    }
    Ok(out)
}

fn parse_atom(xml: &str) -> Result<Vec<FeedEntry>> {
    let feed: AtomFeed = from_str(xml).context("parsing atom xml")?;
    let mut out = Vec::with_capacity(feed.entry.len());
    for e in feed.entry {
        let link = e
            .link
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .or_else(|| e.link.first())
            .map(|l| l.href.trim().to_string())
            .filter(|l| !l.is_empty());
        let title = non_empty(e.title.map(|t| t.value));
        let (Some(title), Some(link)) = (title, link) else {
            continue;
        };
        let published_at = e
            .published
            .as_deref()
            .or(e.updated.as_deref())
            .and_then(parse_rfc3339);
        out.push(FeedEntry {
            title,
            link,
            published_at,
            author: non_empty(e.author.and_then(|a| a.name)),
            description: non_empty(e.summary.map(|s| s.value)),
        });
    }
    Ok(out)
}

/// HTML named entities are not valid XML; replace the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&eacute;", "é")
        .replace("&egrave;", "è")
        .replace("&agrave;", "à")
        .replace("&ccedil;", "ç")
}

/// Feed source over HTTP with a bounded timeout.
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(4)))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_feed(&self, endpoint: &FeedEndpoint) -> Result<FeedParse> {
        let resp = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .with_context(|| format!("GET {}", endpoint.url))?
            .error_for_status()
            .with_context(|| format!("status for {}", endpoint.url))?;
        let body = resp.text().await.context("feed http .text()")?;
        Ok(parse_feed(&body))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves feed documents from memory, keyed by endpoint URL. Unknown URLs fail
/// like an unreachable host.
#[derive(Debug, Default, Clone)]
pub struct FixtureFeedSource {
    docs: HashMap<String, String>,
}

impl FixtureFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, xml: &str) -> Self {
        self.docs.insert(url.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedSource for FixtureFeedSource {
    async fn fetch_feed(&self, endpoint: &FeedEndpoint) -> Result<FeedParse> {
        match self.docs.get(&endpoint.url) {
            Some(xml) => Ok(parse_feed(xml)),
            None => Err(anyhow::anyhow!("no fixture for {}", endpoint.url)),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Le Monde</title>
<item><title>Sommet climat&nbsp;: accord</title><link>https://ex.test/a</link>
<pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate><description>&lt;p&gt;Un accord&lt;/p&gt;</description></item>
<item><title>Sans lien</title></item>
<item><title>Deux</title><link>https://ex.test/b</link><pubDate>Tue, 10 Jun 2025 09:00:00 GMT</pubDate></item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Diploweb</title>
<entry><title type="html">Géopolitique de l'Arctique</title>
<link rel="alternate" href="https://ex.test/arctique"/>
<published>2025-06-10T08:00:00Z</published>
<summary>Analyse</summary><author><name>P. Verluise</name></author></entry>
</feed>"#;

    #[test]
    fn rss_items_without_link_are_skipped() {
        let p = parse_feed(RSS);
        assert!(p.valid);
        assert_eq!(p.entries.len(), 2);
        assert_eq!(p.entries[0].title, "Sommet climat : accord");
        assert_eq!(p.entries[0].description.as_deref(), Some("Un accord"));
        assert!(p.entries[0].published_at.is_some());
        assert!(p.entries[1].published_at.is_some());
    }

    #[test]
    fn atom_entries_are_read() {
        let p = parse_feed(ATOM);
        assert!(p.valid);
        assert_eq!(p.entries.len(), 1);
        assert_eq!(p.entries[0].link, "https://ex.test/arctique");
        assert_eq!(p.entries[0].author.as_deref(), Some("P. Verluise"));
    }

    #[test]
    fn garbage_is_flagged_invalid() {
        assert!(!parse_feed("<html><body>404</body></html>").valid);
        assert!(!parse_feed("<rss><channel><item>").valid);
    }
}
