// src/analyze/ner.rs
//! Person / organization mentions in article text.
//!
//! Two sources are combined:
//! - regex patterns from JSON files in `config/entities/` (or `NER_CONFIG_DIR`);
//!   each file holds `{ "kind": "person" | "organization", "patterns": [{ regex, name }] }`,
//!   and every match counts as one mention of `name`;
//! - a capitalized-span heuristic: runs of capitalized words (with French
//!   particles like "de" inside) are names. Acronyms and spans containing an
//!   organization keyword are organizations, other multi-word spans persons.
//!
//! Regexes must be compatible with the `regex` crate (no lookarounds).

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{EntityKind, SourceEntity};

#[derive(Debug, Deserialize)]
struct Pattern {
    regex: String,
    /// Canonical entity name reported for every match.
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    patterns: Vec<Pattern>,
}

#[derive(Debug)]
struct CompiledPattern {
    re: Regex,
    name: String,
    kind: EntityKind,
}

const ORG_KEYWORDS: &[&str] = &[
    "agence", "assemblée", "association", "banque", "bank", "comité", "commission", "company",
    "conseil", "cour", "fédération", "fonds", "gouvernement", "groupe", "inc", "institut",
    "ministère", "office", "organisation", "parlement", "parti", "sénat", "société", "syndicat",
    "tribunal", "union", "université",
];

/// Capitalized words that start sentences or clauses without naming anyone.
const NOT_A_NAME: &[&str] = &[
    "a", "after", "alors", "an", "au", "aux", "avec", "but", "ce", "ces", "cette", "dans",
    "depuis", "des", "elle", "elles", "en", "et", "il", "ils", "in", "la", "le", "les", "mais",
    "nous", "on", "par", "pour", "quand", "selon", "si", "sur", "the", "un", "une", "lundi",
    "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche", "janvier", "février", "mars",
    "avril", "mai", "juin", "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];

const PARTICLES: &[&str] = &["de", "du", "des", "la", "le", "d'", "von", "van", "of"];

/// Resolve the directory containing entity configs:
/// - If `NER_CONFIG_DIR` is set → use it.
/// - Else use `<current_dir>/config/entities`.
fn ner_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config")
        .join("entities")
}

fn parse_kind(s: &str) -> Option<EntityKind> {
    match s.trim().to_lowercase().as_str() {
        "person" | "personne" | "per" | "persons" => Some(EntityKind::Person),
        "organization" | "organisation" | "org" | "organizations" => Some(EntityKind::Organization),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct EntityExtractor {
    patterns: Vec<CompiledPattern>,
}

impl EntityExtractor {
    /// Heuristic only, no configured patterns.
    pub fn heuristic() -> Self {
        Self::default()
    }

    /// Patterns from `NER_CONFIG_DIR` or `config/entities`. A missing dir is fine.
    pub fn from_default_dir() -> Self {
        Self::from_dir(&ner_config_dir())
    }

    /// Loads every `*.json` in `dir`. Unreadable files and invalid regexes are
    /// skipped with a warning. Kind comes from the file's `kind` field, else its stem.
    pub fn from_dir(dir: &Path) -> Self {
        let mut patterns = Vec::new();
        let Ok(read_dir) = fs::read_dir(dir) else {
            return Self { patterns };
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let cfg = match serde_json::from_str::<ConfigFile>(&content) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "entity config skipped");
                    continue;
                }
            };
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let kind = cfg
                .kind
                .as_deref()
                .and_then(parse_kind)
                .or_else(|| parse_kind(stem))
                .unwrap_or(EntityKind::Organization);

            for pat in cfg.patterns {
                match Regex::new(&pat.regex) {
                    Ok(re) => patterns.push(CompiledPattern {
                        re,
                        name: pat.name,
                        kind,
                    }),
                    Err(e) => tracing::warn!(error = %e, regex = %pat.regex, "bad entity regex"),
                }
            }
        }
        Self { patterns }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Distinct entities with mention counts, most mentioned first.
    pub fn extract(&self, text: &str) -> Vec<SourceEntity> {
        let mut found: HashMap<String, (EntityKind, u32)> = HashMap::new();

        for p in &self.patterns {
            let n = p.re.find_iter(text).count() as u32;
            if n > 0 {
                let slot = found.entry(p.name.clone()).or_insert((p.kind, 0));
                slot.0 = p.kind;
                slot.1 += n;
            }
        }

        for (name, kind) in capitalized_spans(text) {
            // Configured patterns win on kind; the heuristic only adds mentions.
            let slot = found.entry(name).or_insert((kind, 0));
            slot.1 += 1;
        }

        let mut out: Vec<SourceEntity> = found
            .into_iter()
            .map(|(name, (kind, count))| SourceEntity { name, kind, count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

struct Token<'a> {
    word: &'a str,
    sentence_start: bool,
    ends_clause: bool,
}

fn strip_elision(w: &str) -> &str {
    let mut chars = w.char_indices();
    if let (Some((_, c0)), Some((i1, c1))) = (chars.next(), chars.next()) {
        if matches!(c1, '\'' | '\u{2019}')
            && matches!(c0.to_ascii_lowercase(), 'l' | 'd' | 'j' | 'n' | 's' | 'c' | 'm' | 't')
        {
            return &w[i1 + c1.len_utf8()..];
        }
    }
    w
}

fn tokens(text: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut sentence_start = true;
    for raw in text.split_whitespace() {
        let ends_sentence = raw.ends_with(['.', '!', '?']);
        let ends_clause = ends_sentence || raw.ends_with([',', ';', ':', ')', '"', '»']);
        let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-');
        let word = strip_elision(trimmed.trim_matches('\''));
        if !word.is_empty() {
            out.push(Token {
                word,
                sentence_start,
                ends_clause,
            });
        }
        sentence_start = ends_sentence;
    }
    out
}

fn is_capitalized(w: &str) -> bool {
    w.chars().next().is_some_and(char::is_uppercase)
}

fn is_acronym(w: &str) -> bool {
    let letters: Vec<char> = w.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

fn classify_span(words: &[&str]) -> Option<EntityKind> {
    let has_org_keyword = words
        .iter()
        .any(|w| ORG_KEYWORDS.contains(&w.to_lowercase().as_str()));
    if has_org_keyword || words.iter().any(|w| is_acronym(w)) {
        return Some(EntityKind::Organization);
    }
    (2..=4).contains(&words.len()).then_some(EntityKind::Person)
}

/// Every capitalized span in `text`, in order of appearance.
fn capitalized_spans(text: &str) -> Vec<(String, EntityKind)> {
    let toks = tokens(text);
    let mut out = Vec::new();
    let mut i = 0;
    while i < toks.len() {
        let t = &toks[i];
        let skip = !is_capitalized(t.word)
            || (NOT_A_NAME.contains(&t.word.to_lowercase().as_str()) && !is_acronym(t.word));
        if skip {
            i += 1;
            continue;
        }

        let start = i;
        let mut words: Vec<&str> = vec![t.word];
        let mut end = i + 1;
        let mut clause_closed = t.ends_clause;
        while !clause_closed && end < toks.len() {
            let next = &toks[end];
            if is_capitalized(next.word) {
                words.push(next.word);
                clause_closed = next.ends_clause;
                end += 1;
            } else if PARTICLES.contains(&next.word.to_lowercase().as_str())
                && toks.get(end + 1).is_some_and(|n| is_capitalized(n.word))
                && !next.ends_clause
            {
                words.push(next.word);
                end += 1;
            } else {
                break;
            }
        }
        i = end;

        // A lone capitalized word opening a sentence is just grammar.
        if words.len() == 1 && toks[start].sentence_start && !is_acronym(words[0]) {
            continue;
        }
        if let Some(kind) = classify_span(&words) {
            out.push((words.join(" "), kind));
        }
    }
    out
}
