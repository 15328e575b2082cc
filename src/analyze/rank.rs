// src/analyze/rank.rs
//! Editorial importance ranking with a language model, falling back to arrival order.

use std::collections::HashSet;
use std::num::IntErrorKind;
use std::time::Duration;

use metrics::counter;

use crate::analyze::ai_adapter::{AiRequest, DynAiClient};
use crate::models::Article;

const RANK_SYSTEM: &str = "Tu es un rédacteur en chef expérimenté d'un journal français.";

fn rank_prompt(articles: &[Article], top_n: usize) -> String {
    let lines = articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. [{}] {}", i + 1, a.source, a.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Classe ces {n} articles par ordre d'IMPORTANCE JOURNALISTIQUE (du plus important au moins important).\n\n\
         Critères de priorité :\n\
         1. Impact majeur sur la société (politique, économie, santé publique)\n\
         2. Urgence de l'information (événements en cours)\n\
         3. Portée large (national > local, international > national si majeur)\n\
         4. Fiabilité de la source (grands médias > petits sites)\n\
         5. Nouveauté réelle (pas des redites)\n\n\
         Articles :\n{lines}\n\n\
         Réponds UNIQUEMENT avec les numéros des {top_n} articles les plus importants, \
         séparés par des virgules, SANS AUCUN AUTRE TEXTE.\n\
         Exemple de réponse : 3,7,1,12,5",
        n = articles.len(),
    )
}

/// Parses "3, 1,7" into zero-based indices. Out-of-range (including overflowing)
/// and repeated indices are dropped; a non-numeric token or an empty answer is a parse failure.
pub fn parse_ranking(response: &str, n: usize) -> Option<Vec<usize>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut any_number = false;
    for tok in response.split(',').map(str::trim) {
        if tok.is_empty() {
            continue;
        }
        let one_based: i64 = match tok.parse() {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                any_number = true;
                continue;
            }
            Err(_) => return None,
        };
        any_number = true;
        let idx = one_based - 1;
        if (0..n as i64).contains(&idx) && seen.insert(idx as usize) {
            out.push(idx as usize);
        }
    }
    any_number.then_some(out)
}

/// Picks `selected` in order, then pads with the rest in arrival order, up to `top_n`.
fn assemble(articles: Vec<Article>, selected: &[usize], top_n: usize) -> Vec<Article> {
    let want = top_n.min(articles.len());
    let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(want);
    for &i in selected {
        if out.len() == want {
            break;
        }
        if let Some(a) = slots.get_mut(i).and_then(Option::take) {
            out.push(a);
        }
    }
    for a in slots.into_iter().flatten() {
        if out.len() == want {
            break;
        }
        out.push(a);
    }
    out
}

pub struct ImportanceRanker {
    client: DynAiClient,
    timeout: Duration,
}

impl ImportanceRanker {
    pub fn new(client: DynAiClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The `min(N, top_n)` most important articles, most important first.
    /// `N <= top_n` returns the input unchanged without calling the model.
    pub async fn rank_articles(&self, articles: Vec<Article>, top_n: usize) -> Vec<Article> {
        if articles.len() <= top_n {
            return articles;
        }
        if !self.client.is_enabled() {
            counter!("rank_fallback_total").increment(1);
            return assemble(articles, &[], top_n);
        }

        let req = AiRequest {
            system: RANK_SYSTEM.to_string(),
            prompt: rank_prompt(&articles, top_n),
            max_tokens: 64,
        };
        let answer = match tokio::time::timeout(self.timeout, self.client.complete(&req)).await {
            Ok(Some(r)) => r.text,
            Ok(None) => {
                tracing::warn!(provider = self.client.provider_name(), "ranking call failed, keeping arrival order");
                counter!("rank_fallback_total").increment(1);
                return assemble(articles, &[], top_n);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "ranking call timed out, keeping arrival order");
                counter!("rank_fallback_total").increment(1);
                return assemble(articles, &[], top_n);
            }
        };

        match parse_ranking(&answer, articles.len()) {
            Some(selected) => {
                tracing::debug!(selected = ?selected, "ranking parsed");
                assemble(articles, &selected, top_n)
            }
            None => {
                tracing::warn!(answer = %answer, "unparseable ranking, keeping arrival order");
                counter!("rank_fallback_total").increment(1);
                assemble(articles, &[], top_n)
            }
        }
    }
}
