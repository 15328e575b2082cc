//! Results of the last search, handed from "search" to "send newsletter".

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::Article;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Empty,
    Results {
        query: String,
        articles: Vec<Article>,
    },
}

#[derive(Debug, Default)]
pub struct SearchSession {
    state: RwLock<SessionState>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the previous results, even with an empty list.
    pub fn store_results(&self, query: &str, articles: Vec<Article>) {
        let mut g = self.state.write().expect("session lock poisoned");
        *g = SessionState::Results {
            query: query.to_string(),
            articles,
        };
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().expect("session lock poisoned").clone()
    }

    /// Articles of the last search, `None` when there was none or it found nothing.
    pub fn last_articles(&self) -> Option<Vec<Article>> {
        match &*self.state.read().expect("session lock poisoned") {
            SessionState::Results { articles, .. } if !articles.is_empty() => Some(articles.clone()),
            _ => None,
        }
    }

    pub fn clear(&self) {
        *self.state.write().expect("session lock poisoned") = SessionState::Empty;
    }
}

/// Oldest sessions are forgotten past this many.
pub const MAX_SESSIONS: usize = 1024;

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, Arc<SearchSession>>,
    order: VecDeque<String>,
}

/// One `SearchSession` per dashboard client, keyed by an opaque id.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Sessions>,
    seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut h = Sha256::new();
        h.update(n.to_le_bytes());
        h.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        h.finalize()[..12].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The session for `id`, or a new one under a fresh id when `id` is unknown or absent.
    pub fn open(&self, id: Option<&str>) -> (String, Arc<SearchSession>) {
        let mut g = self.inner.lock().expect("session registry poisoned");
        if let Some((id, s)) = id.and_then(|id| g.by_id.get_key_value(id)) {
            return (id.clone(), s.clone());
        }
        let id = self.fresh_id();
        let session = Arc::new(SearchSession::new());
        g.by_id.insert(id.clone(), session.clone());
        g.order.push_back(id.clone());
        while g.order.len() > MAX_SESSIONS {
            if let Some(old) = g.order.pop_front() {
                g.by_id.remove(&old);
            }
        }
        (id, session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<SearchSession>> {
        self.inner
            .lock()
            .expect("session registry poisoned")
            .by_id
            .get(id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("session registry poisoned").by_id.len()
    }
}
