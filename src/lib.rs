// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sentiment;
pub mod session;
pub mod store;
pub mod subscription;
pub mod telemetry;

// Fetching: feeds, search API, page extraction, dedup
pub mod ingest;

// Enrichment: summaries, entities, reliability, ranking, LLM clients
pub mod analyze;

// Newsletter rendering and SMTP delivery
pub mod notify;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::{create_router as router, AppState};
pub use crate::models::{Article, Candidate, SentimentLabel};
pub use crate::pipeline::Pipeline;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{feeds::load_catalog_default, AppConfig};
use crate::notify::email::{EmailSender, Mailer};
use crate::store::{ArticleStore, SqliteStore, SubscriberStore};
use crate::subscription::SubscriptionService;

/// Everything the binaries need, wired from configuration and environment.
pub struct Runtime {
    pub config: AppConfig,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<SqliteStore>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub subscriptions: Arc<SubscriptionService>,
}

impl Runtime {
    /// Fails only on unusable configuration or database. Missing API keys and
    /// SMTP settings disable the matching capability with a warning.
    pub async fn from_env() -> Result<Self> {
        let config = AppConfig::load()?;
        let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
        let catalog = load_catalog_default()?;
        let articles: Arc<dyn ArticleStore> = store.clone();
        let pipeline = Arc::new(Pipeline::from_config(&config, catalog, articles)?);
        let mailer = EmailSender::from_env().map(|m| Arc::new(m) as Arc<dyn Mailer>);
        let subscribers: Arc<dyn SubscriberStore> = store.clone();
        let subscriptions = Arc::new(SubscriptionService::new(subscribers, mailer.clone()));
        Ok(Self {
            config,
            pipeline,
            store,
            mailer,
            subscriptions,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.pipeline.clone(),
            self.store.clone(),
            self.subscriptions.clone(),
            self.mailer.clone(),
        )
    }
}
