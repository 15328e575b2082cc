// src/analyze/mod.rs
//! Content analysis: summary, cited sources and a reliability score for one article.

pub mod ai_adapter;
pub mod ner;
pub mod rank;
pub mod reliability;
pub mod summarize;

use std::sync::Arc;

use crate::analyze::ner::EntityExtractor;
use crate::analyze::reliability::reliability_score;
use crate::analyze::summarize::Summarizer;
use crate::models::{ArticleAnalysis, DEFAULT_SUMMARY};

pub use crate::analyze::rank::ImportanceRanker;

/// Texts shorter than this (in characters) are not analyzed.
pub const MIN_ANALYSIS_CHARS: usize = 200;

pub struct ContentAnalyzer {
    summarizer: Arc<dyn Summarizer>,
    entities: EntityExtractor,
}

impl ContentAnalyzer {
    pub fn new(summarizer: Arc<dyn Summarizer>, entities: EntityExtractor) -> Self {
        Self {
            summarizer,
            entities,
        }
    }

    /// `None` for short text or a failed summary; callers then use the defaults.
    /// A switched-off summarizer still yields an analysis, with summary "Non disponible".
    pub async fn analyze_content(&self, text: &str) -> Option<ArticleAnalysis> {
        if text.chars().count() < MIN_ANALYSIS_CHARS {
            return None;
        }

        let summary = match self.summarizer.summarize(text).await {
            Ok(Some(s)) if !s.trim().is_empty() => s,
            Ok(_) => DEFAULT_SUMMARY.to_string(),
            Err(e) => {
                tracing::warn!(error = ?e, summarizer = self.summarizer.name(), "summary failed");
                return None;
            }
        };

        let sources = self.entities.extract(text);
        let reliability_score = reliability_score(sources.len());
        Some(ArticleAnalysis {
            summary,
            sources,
            reliability_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{CachingClient, DisabledClient, MockProvider};
    use crate::analyze::summarize::{LeadSummarizer, LlmSummarizer};
    use std::time::Duration;

    fn long_text() -> String {
        "Christine Lagarde a présenté les prévisions de la Banque Centrale Européenne. \
         Les marchés ont réagi avec calme à cette annonce attendue depuis plusieurs semaines, \
         et les analystes du FMI estiment que la trajectoire reste compatible avec les objectifs."
            .to_string()
    }

    #[tokio::test]
    async fn short_text_is_not_analyzed() {
        let a = ContentAnalyzer::new(Arc::new(LeadSummarizer), EntityExtractor::heuristic());
        assert!(a.analyze_content("trop court").await.is_none());
    }

    #[tokio::test]
    async fn lead_summary_with_sources() {
        let a = ContentAnalyzer::new(Arc::new(LeadSummarizer), EntityExtractor::heuristic());
        let out = a.analyze_content(&long_text()).await.unwrap();
        assert!(out.summary.starts_with("Christine Lagarde"));
        assert_eq!(out.sources.len(), 3);
        assert_eq!(out.reliability_score, 55);
    }

    #[tokio::test]
    async fn disabled_model_keeps_analysis_with_default_summary() {
        let s = LlmSummarizer::new(Arc::new(DisabledClient), Duration::from_secs(1));
        let a = ContentAnalyzer::new(Arc::new(s), EntityExtractor::heuristic());
        let out = a.analyze_content(&long_text()).await.unwrap();
        assert_eq!(out.summary, DEFAULT_SUMMARY);
    }

    #[tokio::test]
    async fn failing_model_means_no_analysis() {
        let client = CachingClient::new(MockProvider::failing(), None, 10);
        let s = LlmSummarizer::new(Arc::new(client), Duration::from_secs(1));
        let a = ContentAnalyzer::new(Arc::new(s), EntityExtractor::heuristic());
        assert!(a.analyze_content(&long_text()).await.is_none());
    }
}
