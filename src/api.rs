use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::models::{Article, SentimentLabel};
use crate::notify::{email::Mailer, send_newsletter, Delivery};
use crate::pipeline::Pipeline;
use crate::session::SessionRegistry;
use crate::store::ArticleStore;
use crate::subscription::{SubscribeOutcome, SubscriptionService, UnsubscribeOutcome};

/// Articles sent when no search is held in the session.
pub const SEND_FALLBACK_RECENT: usize = 10;
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn ArticleStore>,
    subscriptions: Arc<SubscriptionService>,
    sessions: Arc<SessionRegistry>,
    mailer: Option<Arc<dyn Mailer>>,
    search_topics: Vec<String>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<dyn ArticleStore>,
        subscriptions: Arc<SubscriptionService>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        let search_topics = pipeline.catalog().topics().map(str::to_string).collect();
        Self {
            pipeline,
            store,
            subscriptions,
            sessions: Arc::new(SessionRegistry::new()),
            mailer,
            search_topics,
        }
    }

    /// Topics a dashboard search runs over. Defaults to the whole catalog.
    pub fn with_search_topics(mut self, topics: Vec<String>) -> Self {
        self.search_topics = topics;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search))
        .route("/newsletter/send", post(newsletter_send))
        .route("/articles/latest", get(latest_articles))
        .route("/stats", get(stats))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorOut>);

#[derive(Serialize)]
pub struct ErrorOut {
    error: String,
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorOut { error: msg.into() }))
}

fn internal(e: impl std::fmt::Debug) -> ApiError {
    tracing::warn!(error = ?e, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[derive(Deserialize)]
struct SearchReq {
    query: String,
    /// Id returned by an earlier search; a new session is opened without it.
    #[serde(default)]
    session: Option<String>,
}

#[derive(Serialize)]
struct SearchOut {
    session: String,
    query: String,
    count: usize,
    articles: Vec<Article>,
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchReq>,
) -> Result<Json<SearchOut>, ApiError> {
    let query = body.query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("query must have at least {MIN_QUERY_CHARS} characters"),
        ));
    }

    let articles: Vec<Article> = state
        .pipeline
        .scrape_topics(&state.search_topics, Some(query))
        .await
        .into_iter()
        .flat_map(|(_, arts)| arts)
        .collect();
    let (session_id, session) = state.sessions.open(body.session.as_deref());
    session.store_results(query, articles.clone());

    Ok(Json(SearchOut {
        session: session_id,
        query: query.to_string(),
        count: articles.len(),
        articles,
    }))
}

#[derive(Deserialize, Default)]
struct SendReq {
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Serialize)]
struct SendOut {
    status: &'static str,
    articles: usize,
    delivered: usize,
    failed: usize,
}

async fn newsletter_send(
    State(state): State<AppState>,
    body: Option<Json<SendReq>>,
) -> Result<Json<SendOut>, ApiError> {
    let Some(mailer) = state.mailer.as_deref() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "email delivery is not configured",
        ));
    };

    let SendReq {
        mut recipients,
        session,
    } = body.map(|Json(b)| b).unwrap_or_default();
    if recipients.is_empty() {
        recipients = state
            .subscriptions
            .active_subscribers()
            .await
            .map_err(internal)?
            .into_iter()
            .map(|s| s.email)
            .collect();
    }

    let held = session
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.last_articles());
    let articles = match held {
        Some(a) => a,
        None => state
            .store
            .query_recent(SEND_FALLBACK_RECENT)
            .await
            .map_err(internal)?,
    };

    let out = match send_newsletter(mailer, state.store.as_ref(), &recipients, articles)
        .await
        .map_err(internal)?
    {
        Delivery::Sent {
            articles,
            delivered,
            failed,
        } => SendOut {
            status: "sent",
            articles,
            delivered,
            failed,
        },
        Delivery::NothingToSend => SendOut {
            status: "nothing_to_send",
            articles: 0,
            delivered: 0,
            failed: 0,
        },
        Delivery::NoRecipients => SendOut {
            status: "no_recipients",
            articles: 0,
            delivered: 0,
            failed: 0,
        },
    };
    Ok(Json(out))
}

async fn latest_articles(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let limit = q
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10)
        .clamp(5, 50);
    let rows = state.store.query_recent(limit).await.map_err(internal)?;
    Ok(Json(rows))
}

#[derive(Serialize, Debug, PartialEq)]
pub struct SentimentShare {
    pub count: usize,
    pub percent: f64,
}

#[derive(Serialize, Debug)]
pub struct StatsOut {
    pub total: usize,
    pub positive: SentimentShare,
    pub neutral: SentimentShare,
    pub negative: SentimentShare,
    pub top_sources: Vec<(String, usize)>,
}

/// Sentiment distribution and the five busiest sources.
pub fn compute_stats(articles: &[Article]) -> StatsOut {
    let total = articles.len();
    let share = |label: SentimentLabel| {
        let count = articles
            .iter()
            .filter(|a| a.sentiment_label == label)
            .count();
        let percent = if total == 0 {
            0.0
        } else {
            (count as f64 * 1000.0 / total as f64).round() / 10.0
        };
        SentimentShare { count, percent }
    };

    let mut by_source: HashMap<&str, usize> = HashMap::new();
    for a in articles {
        *by_source.entry(a.source.as_str()).or_default() += 1;
    }
    let mut top_sources: Vec<(String, usize)> = by_source
        .into_iter()
        .map(|(s, n)| (s.to_string(), n))
        .collect();
    top_sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_sources.truncate(5);

    StatsOut {
        total,
        positive: share(SentimentLabel::Positive),
        neutral: share(SentimentLabel::Neutral),
        negative: share(SentimentLabel::Negative),
        top_sources,
    }
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsOut>, ApiError> {
    let all = state.store.all_articles().await.map_err(internal)?;
    Ok(Json(compute_stats(&all)))
}

#[derive(Deserialize)]
struct EmailReq {
    email: String,
}

#[derive(Serialize)]
struct SubscribeOut {
    email: String,
    outcome: SubscribeOutcome,
}

#[derive(Serialize)]
struct UnsubscribeOut {
    email: String,
    outcome: UnsubscribeOutcome,
}

async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<EmailReq>,
) -> Result<Json<SubscribeOut>, ApiError> {
    match state.subscriptions.subscribe(&body.email).await {
        Ok(outcome) => Ok(Json(SubscribeOut {
            email: body.email.trim().to_lowercase(),
            outcome,
        })),
        Err(e) => {
            tracing::debug!(error = ?e, "subscribe rejected");
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<EmailReq>,
) -> Result<Json<UnsubscribeOut>, ApiError> {
    let outcome = state
        .subscriptions
        .unsubscribe(&body.email)
        .await
        .map_err(internal)?;
    Ok(Json(UnsubscribeOut {
        email: body.email.trim().to_lowercase(),
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(source: &str, label: SentimentLabel) -> Article {
        Article {
            id: 0,
            url: format!("https://{source}.test/{}", label.as_str()),
            title: "t".into(),
            source: source.into(),
            topic: "sport".into(),
            published_at: Utc::now(),
            content: String::new(),
            sentiment_score: 0.0,
            sentiment_label: label,
            summary: String::new(),
            reliability_score: 50,
            source_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stats_percentages_and_top_sources() {
        let arts = vec![
            article("lemonde", SentimentLabel::Positive),
            article("lemonde", SentimentLabel::Negative),
            article("lequipe", SentimentLabel::Neutral),
        ];
        let s = compute_stats(&arts);
        assert_eq!(s.total, 3);
        assert_eq!(s.positive, SentimentShare { count: 1, percent: 33.3 });
        assert_eq!(s.top_sources[0], ("lemonde".to_string(), 2));
        assert_eq!(s.top_sources.len(), 2);
    }

    #[test]
    fn stats_on_empty_store() {
        let s = compute_stats(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.negative.percent, 0.0);
        assert!(s.top_sources.is_empty());
    }
}
