// src/config/feeds.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedEndpoint;

pub const ENV_FEEDS_PATH: &str = "NEXUS_FEEDS_PATH";

/// Topic name → ordered feed endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicCatalog {
    topics: BTreeMap<String, Vec<FeedEndpoint>>,
}

#[derive(Deserialize)]
struct CatalogFile {
    topics: BTreeMap<String, Vec<FeedEndpoint>>,
}

fn google_news(site: &str) -> String {
    format!("https://news.google.com/rss/search?q=site:{site}&hl=fr&gl=FR&ceid=FR:fr")
}

fn ep(name: &str, url: &str) -> FeedEndpoint {
    FeedEndpoint {
        name: name.to_string(),
        url: url.to_string(),
    }
}

/// Lower-cases and strips the French accents that show up in topic names, so
/// "Économie", "economie" and "économie" resolve to the same entry.
pub fn fold_topic(topic: &str) -> String {
    topic
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'à' | 'â' | 'ä' => 'a',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

impl TopicCatalog {
    pub fn builtin() -> Self {
        let mut topics = BTreeMap::new();
        topics.insert(
            "économie".to_string(),
            vec![
                ep("lesechos", &google_news("lesechos.fr")),
                ep("latribune", &google_news("latribune.fr")),
                ep("challenges", &google_news("challenges.fr")),
            ],
        );
        topics.insert(
            "climat".to_string(),
            vec![
                ep("lemonde_planete", "https://www.lemonde.fr/planete/rss_full.xml"),
                ep("reporterre", "https://reporterre.net/spip.php?page=backend"),
                ep(
                    "liberation_env",
                    "https://www.liberation.fr/arc/outboundfeeds/rss/category/environnement/",
                ),
            ],
        );
        topics.insert(
            "politique".to_string(),
            vec![
                ep("lemonde_pol", "https://www.lemonde.fr/politique/rss_full.xml"),
                ep(
                    "liberation_pol",
                    "https://www.liberation.fr/arc/outboundfeeds/rss/category/politique/",
                ),
                ep("lefigaro_pol", "https://www.lefigaro.fr/rss/figaro_politique.xml"),
            ],
        );
        topics.insert(
            "géopolitique".to_string(),
            vec![
                ep("lemonde_inter", "https://www.lemonde.fr/international/rss_full.xml"),
                ep("courrierinter", "https://www.courrierinternational.com/feed/all/rss.xml"),
                ep("diploweb", "https://www.diploweb.com/spip.php?page=backend"),
            ],
        );
        topics.insert(
            "sport".to_string(),
            vec![
                ep("lequipe", "https://dwh.lequipe.fr/api/edito/rss?path=/"),
                ep("20minutes_sport", "https://www.20minutes.fr/feeds/rss-sport.xml"),
                ep("google_sport", &google_news("lequipe.fr")),
            ],
        );
        Self { topics }
    }

    pub fn from_map(topics: BTreeMap<String, Vec<FeedEndpoint>>) -> Self {
        Self { topics }
    }

    /// Feeds for `topic`; empty when the topic is unknown or blank.
    pub fn feeds_for(&self, topic: &str) -> &[FeedEndpoint] {
        let key = fold_topic(topic);
        if key.is_empty() {
            return &[];
        }
        self.topics
            .iter()
            .find(|(name, _)| fold_topic(name) == key)
            .map(|(_, feeds)| feeds.as_slice())
            .unwrap_or(&[])
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}

/// Load a catalog from an explicit path. Supports TOML or JSON.
pub fn load_catalog_from(path: &Path) -> Result<TopicCatalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed catalog from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_catalog(&content, ext.as_str())
}

/// Load the catalog using env var + fallbacks:
/// 1) $NEXUS_FEEDS_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
/// 4) built-in catalog
pub fn load_catalog_default() -> Result<TopicCatalog> {
    if let Ok(p) = std::env::var(ENV_FEEDS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_catalog_from(&pb);
        }
        return Err(anyhow!("{ENV_FEEDS_PATH} points to non-existent path"));
    }
    for candidate in ["config/feeds.toml", "config/feeds.json"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_catalog_from(&p);
        }
    }
    Ok(TopicCatalog::builtin())
}

fn parse_catalog(s: &str, hint_ext: &str) -> Result<TopicCatalog> {
    let parsed: CatalogFile = if hint_ext == "json" {
        serde_json::from_str(s).context("parsing json feed catalog")?
    } else if hint_ext == "toml" {
        toml::from_str(s).context("parsing toml feed catalog")?
    } else {
        serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .map_err(|_| anyhow!("unsupported feed catalog format"))?
    };
    Ok(TopicCatalog::from_map(clean(parsed.topics)))
}

fn clean(topics: BTreeMap<String, Vec<FeedEndpoint>>) -> BTreeMap<String, Vec<FeedEndpoint>> {
    topics
        .into_iter()
        .filter_map(|(name, feeds)| {
            let name = name.trim().to_string();
            let feeds: Vec<FeedEndpoint> = feeds
                .into_iter()
                .filter(|f| !f.url.trim().is_empty())
                .collect();
            (!name.is_empty()).then_some((name, feeds))
        })
        .collect()
}
