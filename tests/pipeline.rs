// tests/pipeline.rs
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use nexus::analyze::ai_adapter::{CachingClient, DynAiClient, MockProvider};
use nexus::analyze::ner::EntityExtractor;
use nexus::analyze::summarize::LlmSummarizer;
use nexus::analyze::ContentAnalyzer;
use nexus::analyze::ImportanceRanker;
use nexus::config::feeds::TopicCatalog;
use nexus::ingest::extract::{ContentExtractor, StaticExtractor};
use nexus::ingest::providers::rss::FixtureFeedSource;
use nexus::ingest::types::FeedEndpoint;
use nexus::ingest::{FetchConfig, Fetcher};
use nexus::models::{Article, NewArticle, SentimentLabel, DEFAULT_RELIABILITY, DEFAULT_SUMMARY};
use nexus::pipeline::{CandidateOutcome, Pipeline, PipelineSettings};
use nexus::store::{ArticleStore, MemoryStore, StoreResult};

const FEED_URL: &str = "https://feeds.test/sport";

const HEADLINES: [&str; 8] = [
    "Le PSG remporte la Ligue des champions",
    "Tour de France : Pogacar s'impose au Ventoux",
    "Roland-Garros : une finale historique",
    "Rugby : le XV de France prépare le Tournoi",
    "Handball : les Bleues qualifiées pour les Jeux",
    "Athlétisme : nouveau record d'Europe du 400 m",
    "Voile : le Vendée Globe part des Sables-d'Olonne",
    "Basket : Wembanyama élu rookie de l'année",
];

fn url(i: usize) -> String {
    format!("https://sport.test/article/{i}")
}

/// RSS document with the first `n` headlines, without dates so they count as recent.
fn feed_xml(n: usize) -> String {
    let items: String = HEADLINES
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, t)| {
            format!(
                "<item><title>{t}</title><link>{}</link><description>Résumé {i}</description></item>",
                url(i + 1)
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Sport</title>{items}</channel></rss>"#)
}

fn long_body(i: usize) -> String {
    format!(
        "{} Les supporters ont célébré une victoire magnifique. Selon l'Agence France-Presse, \
         Emmanuel Macron a salué une performance exceptionnelle. Le Comité international olympique \
         suit de près la préparation des athlètes avant la prochaine échéance internationale.",
        HEADLINES[i - 1]
    )
}

fn pages(n: usize) -> StaticExtractor {
    (1..=n).fold(StaticExtractor::new(), |x, i| x.with(&url(i), &long_body(i)))
}

fn fetcher(n: usize) -> Fetcher {
    let mut topics = BTreeMap::new();
    topics.insert(
        "sport".to_string(),
        vec![FeedEndpoint {
            name: "lequipe".into(),
            url: FEED_URL.into(),
        }],
    );
    let feeds = FixtureFeedSource::new().with(FEED_URL, &feed_xml(n));
    Fetcher::new(TopicCatalog::from_map(topics), Arc::new(feeds)).with_config(FetchConfig {
        per_feed_cap: 10,
        ..FetchConfig::default()
    })
}

fn settings(max: usize, concurrency: usize) -> PipelineSettings {
    PipelineSettings {
        max_articles_per_topic: max,
        candidate_concurrency: concurrency,
    }
}

fn mock_client(reply: &str) -> (DynAiClient, Arc<std::sync::atomic::AtomicUsize>) {
    let mock = MockProvider::reply(reply);
    let calls = mock.calls();
    (Arc::new(CachingClient::new(mock, None, 1000)), calls)
}

struct FailingOn {
    inner: StaticExtractor,
    bad_url: String,
}

#[async_trait]
impl ContentExtractor for FailingOn {
    async fn extract(&self, url: &str) -> Result<String> {
        if url == self.bad_url {
            anyhow::bail!("connection reset");
        }
        self.inner.extract(url).await
    }
}

/// Later candidates answer faster, so completion order differs from fetch order.
struct SlowFirst;

#[async_trait]
impl ContentExtractor for SlowFirst {
    async fn extract(&self, url: &str) -> Result<String> {
        let i: usize = url.rsplit('/').next().unwrap_or("1").parse().unwrap_or(1);
        tokio::time::sleep(Duration::from_millis(10 * (6 - i as u64))).await;
        Ok(long_body(i))
    }
}

/// Never reports a URL as present, so only the insert can catch a duplicate,
/// as when another writer stores it between the check and the insert.
struct StaleExistsStore(MemoryStore);

#[async_trait]
impl ArticleStore for StaleExistsStore {
    async fn exists_by_url(&self, _url: &str) -> StoreResult<bool> {
        Ok(false)
    }

    async fn insert(&self, article: NewArticle) -> StoreResult<Article> {
        self.0.insert(article).await
    }

    async fn query_recent(&self, limit: usize) -> StoreResult<Vec<Article>> {
        self.0.query_recent(limit).await
    }

    async fn all_articles(&self) -> StoreResult<Vec<Article>> {
        self.0.all_articles().await
    }
}

#[tokio::test]
async fn second_run_persists_nothing_new() {
    let store = Arc::new(MemoryStore::new());
    let p = Pipeline::builder(fetcher(3), store.clone())
        .extractor(Arc::new(pages(3)))
        .build();

    let first = p.scrape_topic("sport", None).await;
    assert_eq!(first.len(), 3);
    let second = p.scrape_topic("sport", None).await;
    assert!(second.is_empty());

    assert_eq!(store.len(), 3);
    for i in 1..=3 {
        assert_eq!(store.count_url(&url(i)), 1);
    }
}

#[tokio::test]
async fn already_stored_url_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(NewArticle {
            url: url(2),
            title: HEADLINES[1].into(),
            source: "lequipe".into(),
            topic: "sport".into(),
            published_at: Utc::now(),
            content: String::new(),
            sentiment_score: 0.0,
            sentiment_label: SentimentLabel::Neutral,
            summary: DEFAULT_SUMMARY.into(),
            reliability_score: DEFAULT_RELIABILITY,
            source_count: 0,
        })
        .await
        .unwrap();

    let p = Pipeline::builder(fetcher(3), store.clone())
        .extractor(Arc::new(pages(3)))
        .build();
    let got = p.scrape_topic("sport", None).await;

    let urls: Vec<String> = got.iter().map(|a| a.url.clone()).collect();
    assert_eq!(urls, vec![url(1), url(3)]);
    assert_eq!(store.len(), 3);
    assert_eq!(store.count_url(&url(2)), 1);
}

#[tokio::test]
async fn output_is_bounded_but_everything_is_stored() {
    let store = Arc::new(MemoryStore::new());
    let p = Pipeline::builder(fetcher(8), store.clone())
        .extractor(Arc::new(pages(8)))
        .settings(settings(5, 1))
        .build();

    let got = p.scrape_topic("sport", None).await;
    assert_eq!(got.len(), 5);
    // Ranking is off: arrival order.
    assert_eq!(got[0].url, url(1));
    assert_eq!(got[4].url, url(5));
    assert_eq!(store.len(), 8);
}

#[tokio::test]
async fn failing_extraction_only_skips_that_candidate() {
    let store = Arc::new(MemoryStore::new());
    let p = Pipeline::builder(fetcher(5), store.clone())
        .extractor(Arc::new(FailingOn {
            inner: pages(5),
            bad_url: url(3),
        }))
        .build();

    let got = p.scrape_topic("sport", None).await;
    assert_eq!(got.len(), 4);
    assert!(got.iter().all(|a| a.url != url(3)));
    assert_eq!(store.count_url(&url(3)), 0);
}

#[tokio::test]
async fn short_text_gets_default_analysis() {
    let store = Arc::new(MemoryStore::new());
    // Nothing extracted: the title and feed snippet are all there is.
    let p = Pipeline::builder(fetcher(1), store).build();

    let got = p.scrape_topic("sport", None).await;
    assert_eq!(got.len(), 1);
    let a = &got[0];
    assert_eq!(a.summary, DEFAULT_SUMMARY);
    assert_eq!(a.reliability_score, DEFAULT_RELIABILITY);
    assert_eq!(a.source_count, 0);
    assert!(a.content.starts_with(HEADLINES[0]));
}

#[tokio::test]
async fn long_text_is_summarized_and_scored() {
    let (client, calls) = mock_client("Le PSG a gagné la finale au terme d'un match disputé.");
    let analyzer = ContentAnalyzer::new(
        Arc::new(LlmSummarizer::new(client, Duration::from_secs(5))),
        EntityExtractor::heuristic(),
    );
    let p = Pipeline::builder(fetcher(1), Arc::new(MemoryStore::new()))
        .extractor(Arc::new(pages(1)))
        .analyzer(analyzer)
        .build();

    let got = p.scrape_topic("sport", None).await;
    assert_eq!(got.len(), 1);
    let a = &got[0];
    assert_eq!(a.summary, "Le PSG a gagné la finale au terme d'un match disputé.");
    assert!(a.source_count >= 2);
    assert_eq!(a.reliability_score as u32, (40 + 5 * a.source_count).min(100));
    assert_eq!(a.sentiment_label, SentimentLabel::Positive);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_ranking_picks_the_returned_articles() {
    let (client, calls) = mock_client("4, 2");
    let p = Pipeline::builder(fetcher(6), Arc::new(MemoryStore::new()))
        .extractor(Arc::new(pages(6)))
        .ranker(ImportanceRanker::new(client, Duration::from_secs(5)))
        .settings(settings(2, 1))
        .build();

    let got = p.scrape_topic("sport", None).await;
    let urls: Vec<String> = got.iter().map(|a| a.url.clone()).collect();
    assert_eq!(urls, vec![url(4), url(2)]);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_processing_keeps_fetch_order() {
    let p = Pipeline::builder(fetcher(5), Arc::new(MemoryStore::new()))
        .extractor(Arc::new(SlowFirst))
        .settings(settings(5, 4))
        .build();

    let got = p.scrape_topic("sport", None).await;
    let urls: Vec<String> = got.iter().map(|a| a.url.clone()).collect();
    assert_eq!(urls, (1..=5).map(url).collect::<Vec<_>>());
}

#[tokio::test]
async fn blank_and_unknown_topics_return_empty() {
    let p = Pipeline::builder(fetcher(2), Arc::new(MemoryStore::new())).build();
    assert!(p.scrape_topic("  ", None).await.is_empty());
    assert!(p.scrape_topic("cuisine", None).await.is_empty());

    let all = p.scrape_topics(&["sport".to_string(), "cuisine".to_string()], None).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].1.len(), 2);
    assert!(all[1].1.is_empty());
}

#[tokio::test]
async fn insert_race_drops_the_candidate_quietly() {
    let store = Arc::new(StaleExistsStore(MemoryStore::new()));
    let p = Pipeline::builder(fetcher(3), store.clone())
        .extractor(Arc::new(pages(3)))
        .build();

    assert_eq!(p.scrape_topic("sport", None).await.len(), 3);
    assert!(p.scrape_topic("sport", None).await.is_empty());

    for c in fetcher(3).fetch("sport", None).await {
        let outcome = p.process_candidate(c).await;
        assert!(
            matches!(outcome, CandidateOutcome::RaceDuplicate),
            "expected a lost insert race, got {outcome:?}"
        );
    }

    assert_eq!(store.0.len(), 3);
    for i in 1..=3 {
        assert_eq!(store.0.count_url(&url(i)), 1);
    }
}
