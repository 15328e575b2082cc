//! SQLite-backed store (sqlx). One transaction per inserted row.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use super::{ArticleStore, StoreError, StoreResult, SubscriberStore};
use crate::models::{Article, NewArticle, SentimentLabel, Subscriber};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://nexus.db";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url` and ensures the tables exist.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.setup_schema().await?;
        info!(database = %database_url, "sqlite store ready");
        Ok(store)
    }

    /// Private in-memory database; a single connection so every query sees the same data.
    pub async fn in_memory() -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.setup_schema().await?;
        Ok(store)
    }

    async fn setup_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                topic TEXT NOT NULL,
                published_date TEXT NOT NULL,
                content TEXT NOT NULL,
                sentiment_score REAL NOT NULL,
                sentiment_label TEXT NOT NULL,
                summary TEXT NOT NULL,
                reliability_score INTEGER NOT NULL DEFAULT 50,
                source_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                email TEXT PRIMARY KEY,
                is_active INTEGER NOT NULL DEFAULT 1,
                subscribed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn map_unique(e: sqlx::Error, key: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
            key: key.to_string(),
        },
        _ => StoreError::Database(e),
    }
}

fn article_from_row(r: &SqliteRow) -> StoreResult<Article> {
    let label: String = r.try_get("sentiment_label")?;
    let reliability: i64 = r.try_get("reliability_score")?;
    let source_count: i64 = r.try_get("source_count")?;
    Ok(Article {
        id: r.try_get("id")?,
        url: r.try_get("url")?,
        title: r.try_get("title")?,
        source: r.try_get("source")?,
        topic: r.try_get("topic")?,
        published_at: r.try_get::<DateTime<Utc>, _>("published_date")?,
        content: r.try_get("content")?,
        sentiment_score: r.try_get("sentiment_score")?,
        sentiment_label: SentimentLabel::parse(&label),
        summary: r.try_get("summary")?,
        reliability_score: reliability.clamp(0, 100) as u8,
        source_count: source_count.max(0) as u32,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn subscriber_from_row(r: &SqliteRow) -> StoreResult<Subscriber> {
    let active: i64 = r.try_get("is_active")?;
    Ok(Subscriber {
        email: r.try_get("email")?,
        active: active != 0,
        subscribed_at: r.try_get::<DateTime<Utc>, _>("subscribed_at")?,
    })
}

const ARTICLE_COLUMNS: &str = "id, url, title, source, topic, published_date, content, \
     sentiment_score, sentiment_label, summary, reliability_score, source_count, created_at";

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn exists_by_url(&self, url: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM articles WHERE url = ?1")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? > 0)
    }

    async fn insert(&self, article: NewArticle) -> StoreResult<Article> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` on the error path rolls the insert back.
        let res = sqlx::query(
            r#"
            INSERT INTO articles (url, title, source, topic, published_date, content,
                sentiment_score, sentiment_label, summary, reliability_score, source_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.source)
        .bind(&article.topic)
        .bind(article.published_at)
        .bind(&article.content)
        .bind(article.sentiment_score)
        .bind(article.sentiment_label.as_str())
        .bind(&article.summary)
        .bind(article.reliability_score as i64)
        .bind(article.source_count as i64)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, &article.url))?;
        let id = res.last_insert_rowid();

        // The write lock is held now; keep created_at monotonic across clock steps.
        let prev: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT created_at FROM articles WHERE id < ?1 ORDER BY id DESC LIMIT 1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let created_at = match prev {
            Some(prev) if prev > created_at => {
                sqlx::query("UPDATE articles SET created_at = ?1 WHERE id = ?2")
                    .bind(prev)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                prev
            }
            _ => created_at,
        };

        tx.commit().await?;

        debug!(id, url = %article.url, "article stored");
        Ok(article.into_article(id, created_at))
    }

    async fn query_recent(&self, limit: usize) -> StoreResult<Vec<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY id DESC LIMIT ?1");
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(article_from_row).collect()
    }

    async fn all_articles(&self) -> StoreResult<Vec<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(article_from_row).collect()
    }
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<Subscriber>> {
        let row = sqlx::query(
            "SELECT email, is_active, subscribed_at FROM subscribers WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(subscriber_from_row).transpose()
    }

    async fn create_subscriber(&self, email: &str) -> StoreResult<Subscriber> {
        let sub = Subscriber {
            email: email.to_string(),
            active: true,
            subscribed_at: Utc::now(),
        };
        sqlx::query("INSERT INTO subscribers (email, is_active, subscribed_at) VALUES (?1, 1, ?2)")
            .bind(&sub.email)
            .bind(sub.subscribed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, email))?;
        Ok(sub)
    }

    async fn set_subscriber_active(&self, email: &str, active: bool) -> StoreResult<()> {
        let res = sqlx::query("UPDATE subscribers SET is_active = ?2 WHERE email = ?1")
            .bind(email)
            .bind(active as i64)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::SubscriberNotFound {
                email: email.to_string(),
            });
        }
        Ok(())
    }

    async fn active_subscribers(&self) -> StoreResult<Vec<Subscriber>> {
        let rows = sqlx::query(
            "SELECT email, is_active, subscribed_at FROM subscribers WHERE is_active = 1 ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscriber_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, Origin};
    use crate::sentiment::Sentiment;

    fn new_article(url: &str) -> NewArticle {
        let c = Candidate {
            title: "Titre".into(),
            url: url.into(),
            source: "lemonde".into(),
            topic: "climat".into(),
            snippet: String::new(),
            body: None,
            published_at: None,
            author: None,
            origin: Origin::Feed,
        };
        NewArticle::from_candidate(&c, "corps", Sentiment::neutral(), None, Utc::now())
    }

    #[tokio::test]
    async fn insert_then_exists_and_recent_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(!store.exists_by_url("https://a.test/1").await.unwrap());

        let a = store.insert(new_article("https://a.test/1")).await.unwrap();
        let b = store.insert(new_article("https://a.test/2")).await.unwrap();
        assert!(b.id > a.id);
        assert!(store.exists_by_url("https://a.test/1").await.unwrap());

        let recent = store.query_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://a.test/2");
        assert_eq!(recent[1].sentiment_label, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn created_at_never_goes_backwards() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(new_article("https://a.test/1")).await.unwrap();
        // Simulate a wall clock stepped back after the first insert.
        let ahead = Utc::now() + chrono::Duration::hours(1);
        sqlx::query("UPDATE articles SET created_at = ?1")
            .bind(ahead)
            .execute(&store.pool)
            .await
            .unwrap();

        let b = store.insert(new_article("https://a.test/2")).await.unwrap();
        assert_eq!(b.created_at, ahead);
        let recent = store.query_recent(1).await.unwrap();
        assert_eq!(recent[0].created_at, ahead);
    }

    #[tokio::test]
    async fn duplicate_url_is_rejected_atomically() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(new_article("https://a.test/1")).await.unwrap();

        let err = store.insert(new_article("https://a.test/1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.all_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscriber_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_subscriber("a@b.fr").await.unwrap();
        assert!(matches!(
            store.create_subscriber("a@b.fr").await,
            Err(StoreError::Duplicate { .. })
        ));
        store.set_subscriber_active("a@b.fr", false).await.unwrap();
        assert!(store.active_subscribers().await.unwrap().is_empty());
        let found = store.find_subscriber("a@b.fr").await.unwrap().unwrap();
        assert!(!found.active);
        assert!(matches!(
            store.set_subscriber_active("x@y.fr", true).await,
            Err(StoreError::SubscriberNotFound { .. })
        ));
    }
}
