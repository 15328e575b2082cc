// src/pipeline.rs
//! Per-topic orchestration: fetch → dedup gate → extract → classify + analyze →
//! persist → rank. One failing candidate never aborts the topic.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::analyze::ai_adapter::{build_ai_client, DynAiClient};
use crate::analyze::ner::EntityExtractor;
use crate::analyze::summarize::{LeadSummarizer, LlmSummarizer, Summarizer};
use crate::analyze::{ContentAnalyzer, ImportanceRanker};
use crate::config::feeds::TopicCatalog;
use crate::config::AppConfig;
use crate::ingest::extract::{ContentExtractor, HttpExtractor, StaticExtractor};
use crate::ingest::providers::newsapi::NewsApiClient;
use crate::ingest::providers::rss::HttpFeedSource;
use crate::ingest::types::SearchApi;
use crate::ingest::{FetchConfig, Fetcher};
use crate::models::{Article, Candidate, NewArticle};
use crate::sentiment::SentimentAnalyzer;
use crate::store::{ArticleStore, StoreError};

/// Extracted bodies shorter than this fall back to title + snippet.
pub const MIN_BODY_CHARS: usize = 100;

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_candidates_total", "Candidates entering the dedup gate.");
        describe_counter!(
            "pipeline_duplicates_total",
            "Candidates rejected as already stored (pre-check or insert race)."
        );
        describe_counter!("pipeline_persisted_total", "Articles enriched and stored.");
        describe_counter!(
            "pipeline_candidate_errors_total",
            "Candidates skipped after an extraction, analysis or storage error."
        );
        describe_counter!(
            "rank_fallback_total",
            "Rankings that fell back to arrival order."
        );
    });
}

/// Where a single candidate ended up.
#[derive(Debug)]
pub enum CandidateOutcome {
    /// URL already stored before any enrichment work.
    Duplicate,
    /// Another writer stored the URL between the check and the insert.
    RaceDuplicate,
    Persisted(Article),
    Failed(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_articles_per_topic: usize,
    /// Candidates of one topic processed at once; output order stays the fetch order.
    pub candidate_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_articles_per_topic: 5,
            candidate_concurrency: 1,
        }
    }
}

pub struct Pipeline {
    fetcher: Fetcher,
    extractor: Arc<dyn ContentExtractor>,
    sentiment: SentimentAnalyzer,
    analyzer: ContentAnalyzer,
    ranker: ImportanceRanker,
    store: Arc<dyn ArticleStore>,
    settings: PipelineSettings,
}

pub struct PipelineBuilder {
    fetcher: Fetcher,
    store: Arc<dyn ArticleStore>,
    extractor: Option<Arc<dyn ContentExtractor>>,
    analyzer: Option<ContentAnalyzer>,
    ranker: Option<ImportanceRanker>,
    settings: PipelineSettings,
}

impl PipelineBuilder {
    pub fn extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn analyzer(mut self, analyzer: ContentAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn ranker(mut self, ranker: ImportanceRanker) -> Self {
        self.ranker = Some(ranker);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Unset parts default to offline behavior: no page fetches, lead summaries,
    /// heuristic entities, arrival-order ranking.
    pub fn build(self) -> Pipeline {
        let disabled: DynAiClient = Arc::new(crate::analyze::ai_adapter::DisabledClient);
        Pipeline {
            fetcher: self.fetcher,
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(StaticExtractor::new())),
            sentiment: SentimentAnalyzer::new(),
            analyzer: self.analyzer.unwrap_or_else(|| {
                ContentAnalyzer::new(Arc::new(LeadSummarizer), EntityExtractor::heuristic())
            }),
            ranker: self
                .ranker
                .unwrap_or_else(|| ImportanceRanker::new(disabled, std::time::Duration::from_secs(30))),
            store: self.store,
            settings: PipelineSettings {
                max_articles_per_topic: self.settings.max_articles_per_topic.max(1),
                candidate_concurrency: self.settings.candidate_concurrency.max(1),
            },
        }
    }
}

impl Pipeline {
    pub fn builder(fetcher: Fetcher, store: Arc<dyn ArticleStore>) -> PipelineBuilder {
        PipelineBuilder {
            fetcher,
            store,
            extractor: None,
            analyzer: None,
            ranker: None,
            settings: PipelineSettings::default(),
        }
    }

    /// Production wiring. Missing NewsAPI key or AI config disables those
    /// capabilities here, once, with a warning.
    pub fn from_config(
        cfg: &AppConfig,
        catalog: TopicCatalog,
        store: Arc<dyn ArticleStore>,
    ) -> Result<Self> {
        let feeds = Arc::new(HttpFeedSource::new(cfg.feed_timeout())?);
        let search: Option<Arc<dyn SearchApi>> = match cfg.newsapi_key.as_deref() {
            Some(key) => Some(Arc::new(NewsApiClient::new(key, cfg.search_timeout())?)),
            None => {
                tracing::warn!("NEWSAPI_KEY missing, query search disabled");
                None
            }
        };
        let fetcher = Fetcher::new(catalog, feeds)
            .with_search(search)
            .with_config(FetchConfig {
                per_feed_cap: cfg.per_feed_cap,
                search_max_results: 10,
                max_age_days: cfg.max_age_days,
            });

        let ai = build_ai_client();
        let summarizer: Arc<dyn Summarizer> = if ai.is_enabled() {
            Arc::new(LlmSummarizer::new(ai.clone(), cfg.model_timeout()))
        } else {
            Arc::new(LeadSummarizer)
        };

        Ok(Self::builder(fetcher, store)
            .extractor(Arc::new(HttpExtractor::new(cfg.extract_timeout())?))
            .analyzer(ContentAnalyzer::new(
                summarizer,
                EntityExtractor::from_default_dir(),
            ))
            .ranker(ImportanceRanker::new(ai, cfg.model_timeout()))
            .settings(PipelineSettings {
                max_articles_per_topic: cfg.max_articles_per_topic,
                candidate_concurrency: cfg.candidate_concurrency,
            })
            .build())
    }

    pub fn catalog(&self) -> &TopicCatalog {
        self.fetcher.catalog()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Enriched, persisted articles for `topic`, at most `max_articles_per_topic`.
    pub async fn scrape_topic(&self, topic: &str, query: Option<&str>) -> Vec<Article> {
        ensure_metrics_described();
        if topic.trim().is_empty() {
            return Vec::new();
        }
        let t0 = Instant::now();
        let candidates = self.fetcher.fetch(topic, query).await;
        let n_candidates = candidates.len();

        let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
            .map(|c| self.process_candidate(c))
            .buffered(self.settings.candidate_concurrency.max(1))
            .collect()
            .await;

        let mut collected = Vec::new();
        let (mut dups, mut failed) = (0usize, 0usize);
        for o in outcomes {
            match o {
                CandidateOutcome::Persisted(a) => collected.push(a),
                CandidateOutcome::Duplicate | CandidateOutcome::RaceDuplicate => dups += 1,
                CandidateOutcome::Failed(_) => failed += 1,
            }
        }

        let max = self.settings.max_articles_per_topic;
        let out = if collected.len() > max {
            self.ranker.rank_articles(collected, max).await
        } else {
            collected
        };

        tracing::info!(
            topic = %topic,
            candidates = n_candidates,
            duplicates = dups,
            failed,
            returned = out.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "topic scraped"
        );
        out
    }

    /// Topics run concurrently; results come back in input order.
    pub async fn scrape_topics(
        &self,
        topics: &[String],
        query: Option<&str>,
    ) -> Vec<(String, Vec<Article>)> {
        let runs = topics.iter().map(|t| async move {
            let articles = self.scrape_topic(t, query).await;
            (t.clone(), articles)
        });
        futures::future::join_all(runs).await
    }

    /// Every topic of the catalog, without a query.
    pub async fn run_full_cycle(&self) -> Vec<(String, Vec<Article>)> {
        let topics: Vec<String> = self.catalog().topics().map(str::to_string).collect();
        self.scrape_topics(&topics, None).await
    }

    pub async fn process_candidate(&self, c: Candidate) -> CandidateOutcome {
        counter!("pipeline_candidates_total").increment(1);
        let outcome = self.process_inner(&c).await;
        match &outcome {
            CandidateOutcome::Duplicate | CandidateOutcome::RaceDuplicate => {
                tracing::debug!(url = %c.url, "duplicate skipped");
                counter!("pipeline_duplicates_total").increment(1);
            }
            CandidateOutcome::Persisted(a) => {
                tracing::debug!(id = a.id, url = %a.url, "article persisted");
                counter!("pipeline_persisted_total").increment(1);
            }
            CandidateOutcome::Failed(e) => {
                tracing::warn!(error = ?e, url = %c.url, topic = %c.topic, "candidate skipped");
                counter!("pipeline_candidate_errors_total").increment(1);
            }
        }
        outcome
    }

    async fn process_inner(&self, c: &Candidate) -> CandidateOutcome {
        match self.store.exists_by_url(&c.url).await {
            Ok(true) => return CandidateOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => return CandidateOutcome::Failed(e.into()),
        }

        let extracted = match self.extractor.extract(&c.url).await {
            Ok(t) => t,
            Err(e) => return CandidateOutcome::Failed(e.context("extraction")),
        };
        let text = self.analysis_text(c, extracted);

        let sentiment = self.sentiment.classify(&text);
        let analysis = self.analyzer.analyze_content(&text).await;
        let article = NewArticle::from_candidate(c, &text, sentiment, analysis, Utc::now());

        match self.store.insert(article).await {
            Ok(stored) => CandidateOutcome::Persisted(stored),
            Err(StoreError::Duplicate { .. }) => CandidateOutcome::RaceDuplicate,
            Err(e) => CandidateOutcome::Failed(anyhow::Error::new(e).context("insert")),
        }
    }

    /// Extracted body when long enough, else the feed/search body, else title + snippet.
    fn analysis_text(&self, c: &Candidate, extracted: String) -> String {
        if extracted.chars().count() >= MIN_BODY_CHARS {
            return extracted;
        }
        match c.body.as_deref() {
            Some(b) if b.chars().count() >= MIN_BODY_CHARS => b.to_string(),
            _ => c.title_and_snippet(),
        }
    }
}
