// src/analyze/summarize.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::analyze::ai_adapter::{AiRequest, DynAiClient};
use crate::models::truncate_chars;

/// Only the head of an article is sent to the summarizer.
pub const SUMMARY_INPUT_CHARS: usize = 3000;
pub const SUMMARY_MIN_WORDS: usize = 30;
pub const SUMMARY_MAX_WORDS: usize = 130;

const SUMMARY_SYSTEM: &str = "Tu es journaliste. Résume l'article fourni en français, \
     en 30 à 130 mots, en un seul paragraphe, sans titre ni préambule.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// `Ok(None)` when summarization is switched off; `Err` when an attempt failed.
    async fn summarize(&self, text: &str) -> Result<Option<String>>;
    fn name(&self) -> &'static str;
}

/// Caps `text` at `max` words, marking the cut with an ellipsis.
pub fn clamp_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return words.join(" ");
    }
    format!("{}…", words[..max].join(" "))
}

/// Summaries from the configured language model, bounded by `timeout`.
pub struct LlmSummarizer {
    client: DynAiClient,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(client: DynAiClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<Option<String>> {
        if !self.client.is_enabled() {
            return Ok(None);
        }
        let req = AiRequest {
            system: SUMMARY_SYSTEM.to_string(),
            prompt: truncate_chars(text, SUMMARY_INPUT_CHARS),
            max_tokens: 300,
        };
        match tokio::time::timeout(self.timeout, self.client.complete(&req)).await {
            Err(_) => Err(anyhow!("summary timed out after {:?}", self.timeout)),
            Ok(None) => Err(anyhow!(
                "{} returned no summary",
                self.client.provider_name()
            )),
            Ok(Some(r)) => Ok(Some(clamp_words(&r.text, SUMMARY_MAX_WORDS))),
        }
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// Offline summarizer: leading sentences until at least 30 words.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeadSummarizer;

#[async_trait]
impl Summarizer for LeadSummarizer {
    async fn summarize(&self, text: &str) -> Result<Option<String>> {
        Ok(Some(lead_summary(&truncate_chars(text, SUMMARY_INPUT_CHARS))))
    }

    fn name(&self) -> &'static str {
        "lead"
    }
}

pub fn lead_summary(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for w in text.split_whitespace() {
        out.push(w);
        let sentence_end = w.ends_with(['.', '!', '?']);
        if (sentence_end && out.len() >= SUMMARY_MIN_WORDS) || out.len() >= SUMMARY_MAX_WORDS {
            break;
        }
    }
    clamp_words(&out.join(" "), SUMMARY_MAX_WORDS)
}
