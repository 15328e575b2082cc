// tests/metrics.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use shuttle_axum::axum::body::{self, Body};
use shuttle_axum::axum::http::{Request, StatusCode};
use tower::ServiceExt;

use nexus::config::feeds::TopicCatalog;
use nexus::ingest::providers::rss::FixtureFeedSource;
use nexus::ingest::types::FeedEndpoint;
use nexus::ingest::Fetcher;
use nexus::metrics::Metrics;
use nexus::pipeline::Pipeline;
use nexus::store::MemoryStore;

const FEED: &str = r#"<rss version="2.0"><channel>
<item><title>Budget : le Sénat adopte le texte</title><link>https://pol.test/1</link></item>
</channel></rss>"#;

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_series() {
    let metrics = Metrics::init().expect("install recorder");
    // A second init reuses the installed recorder.
    let again = Metrics::init().expect("reuse recorder");

    let mut topics = BTreeMap::new();
    topics.insert(
        "politique".to_string(),
        vec![
            FeedEndpoint {
                name: "lemonde".into(),
                url: "https://feeds.test/pol".into(),
            },
            FeedEndpoint {
                name: "offline".into(),
                url: "https://feeds.test/offline".into(),
            },
        ],
    );
    let feeds = FixtureFeedSource::new().with("https://feeds.test/pol", FEED);
    let fetcher = Fetcher::new(TopicCatalog::from_map(topics), Arc::new(feeds));
    let pipeline = Pipeline::builder(fetcher, Arc::new(MemoryStore::new())).build();
    assert_eq!(pipeline.scrape_topic("politique", None).await.len(), 1);
    assert!(pipeline.scrape_topic("politique", None).await.is_empty());

    let resp = metrics
        .router::<()>()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "pipeline_candidates_total",
        "pipeline_persisted_total",
        "pipeline_duplicates_total",
        "ingest_feed_errors_total",
        "ingest_events_total",
        "ingest_parse_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    assert!(!again.handle.render().is_empty());
}
