//! In-process store, used by tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{ArticleStore, StoreError, StoreResult, SubscriberStore};
use crate::models::{Article, NewArticle, Subscriber};

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<Article>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows carrying `url` (0 or 1 unless the invariant broke).
    pub fn count_url(&self, url: &str) -> usize {
        let v = self.articles.lock().expect("store mutex poisoned");
        v.iter().filter(|a| a.url == url).count()
    }

    pub fn len(&self) -> usize {
        self.articles.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn exists_by_url(&self, url: &str) -> StoreResult<bool> {
        Ok(self.count_url(url) > 0)
    }

    async fn insert(&self, article: NewArticle) -> StoreResult<Article> {
        // Check and push under one lock: same atomicity as a UNIQUE index.
        let mut v = self.articles.lock().expect("store mutex poisoned");
        if v.iter().any(|a| a.url == article.url) {
            return Err(StoreError::Duplicate { key: article.url });
        }
        let id = v.last().map(|a| a.id + 1).unwrap_or(1);
        let now = Utc::now();
        let created_at = match v.last() {
            Some(prev) if prev.created_at > now => prev.created_at,
            _ => now,
        };
        let stored = article.into_article(id, created_at);
        v.push(stored.clone());
        Ok(stored)
    }

    async fn query_recent(&self, limit: usize) -> StoreResult<Vec<Article>> {
        let v = self.articles.lock().expect("store mutex poisoned");
        Ok(v.iter().rev().take(limit).cloned().collect())
    }

    async fn all_articles(&self) -> StoreResult<Vec<Article>> {
        Ok(self.articles.lock().expect("store mutex poisoned").clone())
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<Subscriber>> {
        let v = self.subscribers.lock().expect("store mutex poisoned");
        Ok(v.iter().find(|s| s.email == email).cloned())
    }

    async fn create_subscriber(&self, email: &str) -> StoreResult<Subscriber> {
        let mut v = self.subscribers.lock().expect("store mutex poisoned");
        if v.iter().any(|s| s.email == email) {
            return Err(StoreError::Duplicate {
                key: email.to_string(),
            });
        }
        let sub = Subscriber {
            email: email.to_string(),
            active: true,
            subscribed_at: Utc::now(),
        };
        v.push(sub.clone());
        Ok(sub)
    }

    async fn set_subscriber_active(&self, email: &str, active: bool) -> StoreResult<()> {
        let mut v = self.subscribers.lock().expect("store mutex poisoned");
        match v.iter_mut().find(|s| s.email == email) {
            Some(s) => {
                s.active = active;
                Ok(())
            }
            None => Err(StoreError::SubscriberNotFound {
                email: email.to_string(),
            }),
        }
    }

    async fn active_subscribers(&self) -> StoreResult<Vec<Subscriber>> {
        let v = self.subscribers.lock().expect("store mutex poisoned");
        Ok(v.iter().filter(|s| s.active).cloned().collect())
    }
}
