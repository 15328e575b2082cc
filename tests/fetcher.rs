// tests/fetcher.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nexus::config::feeds::TopicCatalog;
use nexus::ingest::providers::rss::FixtureFeedSource;
use nexus::ingest::types::{FeedEndpoint, SearchApi, SearchArticle, SearchRequest};
use nexus::ingest::{FetchConfig, Fetcher};
use nexus::models::Origin;

const LEMONDE: &str = include_str!("fixtures/lemonde_climat.xml");
const REPORTERRE: &str = include_str!("fixtures/reporterre_atom.xml");
const MALFORMED: &str = include_str!("fixtures/malformed.xml");

fn ep(name: &str, url: &str) -> FeedEndpoint {
    FeedEndpoint {
        name: name.into(),
        url: url.into(),
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 11, 12, 0, 0).unwrap()
}

fn climate_fetcher() -> Fetcher {
    let mut topics = BTreeMap::new();
    topics.insert(
        "climat".to_string(),
        vec![
            ep("lemonde", "https://feeds.test/lemonde"),
            ep("broken", "https://feeds.test/broken"),
            ep("reporterre", "https://feeds.test/reporterre"),
            ep("offline", "https://feeds.test/offline"),
        ],
    );
    let feeds = FixtureFeedSource::new()
        .with("https://feeds.test/lemonde", LEMONDE)
        .with("https://feeds.test/broken", MALFORMED)
        .with("https://feeds.test/reporterre", REPORTERRE);
    Fetcher::new(TopicCatalog::from_map(topics), Arc::new(feeds))
}

struct CannedSearch {
    fail: bool,
}

#[async_trait]
impl SearchApi for CannedSearch {
    async fn search(&self, req: &SearchRequest) -> Result<Vec<SearchArticle>> {
        if self.fail {
            anyhow::bail!("rate limited");
        }
        assert_eq!(req.language, "fr");
        Ok(vec![
            SearchArticle {
                title: "Glaciers : le rapport du GIEC".into(),
                url: "https://search.test/giec".into(),
                source_name: "France Info".into(),
                published_at: Some(now()),
                description: Some("Synthèse".into()),
                content: Some("Le GIEC publie un rapport sur les glaciers.".into()),
                author: None,
            },
            SearchArticle {
                title: "Hors sujet".into(),
                url: "https://search.test/hors-sujet".into(),
                source_name: "France Info".into(),
                published_at: None,
                description: Some("Rien à voir".into()),
                content: None,
                author: None,
            },
        ])
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

#[tokio::test]
async fn broken_feeds_do_not_hide_healthy_ones() {
    let got = climate_fetcher().fetch_at("climat", None, now()).await;
    let urls: Vec<&str> = got.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://www.lemonde.test/planete/article/1",
            "https://www.lemonde.test/planete/article/2",
            "https://www.lemonde.test/planete/article/3",
            "https://reporterre.test/fonte-des-glaciers",
            "https://reporterre.test/secheresse",
        ]
    );
    assert!(got.iter().all(|c| c.origin == Origin::Feed && c.topic == "climat"));
    assert_eq!(got[0].author.as_deref(), None);
    assert_eq!(got[0].title, "Sommet de Bonn : un accord a minima sur le climat");
}

#[tokio::test]
async fn query_filters_before_the_per_feed_cap() {
    let got = climate_fetcher()
        .fetch_at("Climat", Some("glacier"), now())
        .await;
    let urls: Vec<&str> = got.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://www.lemonde.test/planete/article/2",
            "https://www.lemonde.test/planete/article/4",
            "https://reporterre.test/fonte-des-glaciers",
        ]
    );
}

#[tokio::test]
async fn search_results_come_first_and_are_filtered() {
    let fetcher = climate_fetcher().with_search(Some(Arc::new(CannedSearch { fail: false })));
    let got = fetcher.fetch_at("climat", Some("glacier"), now()).await;
    assert_eq!(got.len(), 4);
    assert_eq!(got[0].url, "https://search.test/giec");
    assert_eq!(got[0].origin, Origin::Search);
    assert_eq!(got[0].source, "France Info");
    assert!(got[0].body.as_deref().is_some_and(|b| b.contains("GIEC")));
    assert!(got.iter().all(|c| c.url != "https://search.test/hors-sujet"));
}

#[tokio::test]
async fn search_failure_falls_back_to_feeds() {
    let fetcher = climate_fetcher().with_search(Some(Arc::new(CannedSearch { fail: true })));
    let got = fetcher.fetch_at("climat", Some("glacier"), now()).await;
    assert_eq!(got.len(), 3);
    assert!(got.iter().all(|c| c.origin == Origin::Feed));
}

#[tokio::test]
async fn unknown_or_blank_topics_yield_nothing() {
    let f = climate_fetcher();
    assert!(f.fetch_at("astronomie", None, now()).await.is_empty());
    assert!(f.fetch_at("   ", None, now()).await.is_empty());
}

#[tokio::test]
async fn huge_max_age_disables_the_cutoff() {
    let fetcher = climate_fetcher().with_config(FetchConfig {
        per_feed_cap: 10,
        max_age_days: 1_000_000_000,
        ..FetchConfig::default()
    });
    // Runs on its own task so a panic would surface as a JoinError.
    let got = tokio::spawn(async move { fetcher.fetch_at("climat", None, now()).await })
        .await
        .expect("fetch must not panic");
    assert!(got
        .iter()
        .any(|c| c.url == "https://www.lemonde.test/planete/article/5"));
    assert_eq!(
        got.iter().filter(|c| c.url.contains("lemonde.test")).count(),
        5
    );
}
