//! Local lexicon sentiment classifier (French + English).
//!
//! Deterministic for a given text and embedded lexicon; no network access.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::SentimentLabel;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Normalization constant for `raw / sqrt(raw² + ALPHA)`.
const ALPHA: f64 = 15.0;

/// Scores at or beyond this magnitude get a polar label.
pub const LABEL_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Polarity in (-1, 1).
    pub score: f64,
    pub label: SentimentLabel,
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
        }
    }

    fn from_score(score: f64) -> Self {
        let label = if score >= LABEL_THRESHOLD {
            SentimentLabel::Positive
        } else if score <= -LABEL_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        Self { score, label }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (raw lexicon score, token count).
    /// Negation: a negator within the previous 1..=3 tokens flips the word's sign.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    /// Polarity score plus label. Empty input is neutral.
    pub fn classify(&self, text: &str) -> Sentiment {
        let (raw, tokens) = self.score_text(text);
        if tokens == 0 || raw == 0 {
            return Sentiment::neutral();
        }
        let raw = raw as f64;
        Sentiment::from_score(raw / (raw * raw + ALPHA).sqrt())
    }
}

/// Lower-cased alphanumeric tokens; apostrophes split elisions ("d'inquiétude").
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "ne" | "n"
            | "pas"
            | "jamais"
            | "aucun"
            | "aucune"
            | "sans"
            | "ni"
            | "not"
            | "no"
            | "never"
            | "without"
            | "cannot"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_positive_sentence() {
        let s = SentimentAnalyzer::new()
            .classify("Le marché est en plein essor et les investisseurs sont ravis");
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!(s.score > 0.0);
    }

    #[test]
    fn french_negative_sentence() {
        let s = SentimentAnalyzer::new()
            .classify("La crise économique provoque beaucoup d'inquiétude");
        assert_eq!(s.label, SentimentLabel::Negative);
        assert!(s.score < 0.0);
    }

    #[test]
    fn empty_and_short_inputs_are_neutral() {
        let a = SentimentAnalyzer::new();
        assert_eq!(a.classify(""), Sentiment::neutral());
        assert_eq!(a.classify("ok"), Sentiment::neutral());
    }

    #[test]
    fn negation_flips_valence() {
        let a = SentimentAnalyzer::new();
        let (plain, _) = a.score_text("une victoire");
        let (neg, _) = a.score_text("ce n'est pas une victoire");
        assert!(plain > 0);
        assert!(neg < 0);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let a = SentimentAnalyzer::new();
        let s = a.classify(&"catastrophe ".repeat(200));
        assert!(s.score > -1.0 && s.score < 0.0);
    }
}
