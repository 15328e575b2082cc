//! Persistence seam: articles (append-only, unique by URL) and subscribers.
//!
//! The UNIQUE constraint on `url` is the authority for deduplication; the
//! pipeline's `exists_by_url` pre-check only avoids wasted enrichment work.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::models::{Article, NewArticle, Subscriber};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// UNIQUE constraint violation (article URL or subscriber email).
    #[error("unique constraint violated for {key}")]
    Duplicate { key: String },

    #[error("subscriber not found: {email}")]
    SubscriberNotFound { email: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn exists_by_url(&self, url: &str) -> StoreResult<bool>;

    /// Atomically inserts one article. A URL that is already present fails with
    /// `StoreError::Duplicate` and leaves the store unchanged.
    async fn insert(&self, article: NewArticle) -> StoreResult<Article>;

    /// Most recently inserted first.
    async fn query_recent(&self, limit: usize) -> StoreResult<Vec<Article>>;

    async fn all_articles(&self) -> StoreResult<Vec<Article>>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<Subscriber>>;

    /// Creates an active subscriber; an existing email fails with `Duplicate`.
    async fn create_subscriber(&self, email: &str) -> StoreResult<Subscriber>;

    async fn set_subscriber_active(&self, email: &str, active: bool) -> StoreResult<()>;

    async fn active_subscribers(&self) -> StoreResult<Vec<Subscriber>>;
}
