//! Core data model: ephemeral candidates, persisted articles and subscribers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored article bodies are capped at this many characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Summary substituted when no analysis is available.
pub const DEFAULT_SUMMARY: &str = "Non disponible";

/// Reliability substituted when no analysis is available.
pub const DEFAULT_RELIABILITY: u8 = 50;

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Feed,
    Search,
}

/// Freshly fetched, unpersisted article-like item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub source: String,
    pub topic: String,
    pub snippet: String,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub origin: Origin,
}

impl Candidate {
    /// True when the publication date is unknown or within the last `days_back` days.
    /// A window too large to represent means no cutoff.
    pub fn is_recent(&self, now: DateTime<Utc>, days_back: i64) -> bool {
        let Some(ts) = self.published_at else {
            return true;
        };
        match Duration::try_days(days_back).and_then(|d| now.checked_sub_signed(d)) {
            Some(cutoff) => ts >= cutoff,
            None => true,
        }
    }

    /// Text used when the extracted body is too short to analyze.
    pub fn title_and_snippet(&self) -> String {
        if self.snippet.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}. {}", self.title, self.snippet)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Reader-facing French label used by the newsletter and the CLI.
    pub fn display_fr(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positif",
            SentimentLabel::Neutral => "neutre",
            SentimentLabel::Negative => "négatif",
        }
    }

    /// Lenient parse of stored labels; unknown values map to `Neutral`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positif" => SentimentLabel::Positive,
            "negative" | "négatif" | "negatif" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Organization,
}

/// A person or organization cited in an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntity {
    pub name: String,
    pub kind: EntityKind,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub summary: String,
    pub sources: Vec<SourceEntity>,
    pub reliability_score: u8,
}

/// A fully enriched article that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub source: String,
    pub topic: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub summary: String,
    pub reliability_score: u8,
    pub source_count: u32,
}

impl NewArticle {
    /// Builds the enriched article from a candidate, its analysis text and the
    /// enrichment results. `analysis == None` substitutes the documented defaults.
    pub fn from_candidate(
        candidate: &Candidate,
        text: &str,
        sentiment: crate::sentiment::Sentiment,
        analysis: Option<ArticleAnalysis>,
        now: DateTime<Utc>,
    ) -> Self {
        let (summary, reliability_score, source_count) = match analysis {
            Some(a) => (a.summary, a.reliability_score, a.sources.len() as u32),
            None => (DEFAULT_SUMMARY.to_string(), DEFAULT_RELIABILITY, 0),
        };
        Self {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            source: candidate.source.clone(),
            topic: candidate.topic.clone(),
            published_at: candidate.published_at.unwrap_or(now),
            content: truncate_chars(text, MAX_CONTENT_CHARS),
            sentiment_score: sentiment.score,
            sentiment_label: sentiment.label,
            summary,
            reliability_score: reliability_score.min(100),
            source_count,
        }
    }

    pub fn into_article(self, id: i64, created_at: DateTime<Utc>) -> Article {
        Article {
            id,
            url: self.url,
            title: self.title,
            source: self.source,
            topic: self.topic,
            published_at: self.published_at,
            content: self.content,
            sentiment_score: self.sentiment_score,
            sentiment_label: self.sentiment_label,
            summary: self.summary,
            reliability_score: self.reliability_score,
            source_count: self.source_count,
            created_at,
        }
    }
}

/// A persisted, fully enriched article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub source: String,
    pub topic: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub summary: String,
    pub reliability_score: u8,
    pub source_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub active: bool,
    pub subscribed_at: DateTime<Utc>,
}

/// Char-boundary safe truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
