//! Application configuration: `config/nexus.toml` with environment overrides.

pub mod ai;
pub mod feeds;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::sqlite::DEFAULT_DATABASE_URL;

pub const ENV_CONFIG_PATH: &str = "NEXUS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/nexus.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub newsapi_key: Option<String>,
    pub max_articles_per_topic: usize,
    pub per_feed_cap: usize,
    pub max_age_days: i64,
    pub feed_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub model_timeout_secs: u64,
    pub candidate_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            newsapi_key: None,
            max_articles_per_topic: 5,
            per_feed_cap: 3,
            max_age_days: 7,
            feed_timeout_secs: 5,
            search_timeout_secs: 10,
            extract_timeout_secs: 10,
            model_timeout_secs: 30,
            candidate_concurrency: 1,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// `$NEXUS_CONFIG_PATH`, else `config/nexus.toml`, else defaults; then env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NEXUS_DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = url;
            }
        }
        if let Ok(key) = std::env::var("NEWSAPI_KEY") {
            if !key.trim().is_empty() {
                self.newsapi_key = Some(key.trim().to_string());
            }
        }
        if let Some(n) = std::env::var("NEXUS_MAX_ARTICLES_PER_TOPIC")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.max_articles_per_topic = n;
        }
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        if self.max_articles_per_topic == 0 {
            self.max_articles_per_topic = d.max_articles_per_topic;
        }
        if self.per_feed_cap == 0 {
            self.per_feed_cap = d.per_feed_cap;
        }
        if self.candidate_concurrency == 0 {
            self.candidate_concurrency = 1;
        }
        if self.newsapi_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.newsapi_key = None;
        }
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_env() {
        for k in [
            ENV_CONFIG_PATH,
            "NEXUS_DATABASE_URL",
            "NEWSAPI_KEY",
            "NEXUS_MAX_ARTICLES_PER_TOPIC",
        ] {
            env::remove_var(k);
        }
    }

    #[serial_test::serial]
    #[test]
    fn file_values_then_env_overrides() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nexus.toml");
        std::fs::write(&p, "max_articles_per_topic = 8\nper_feed_cap = 0\nnewsapi_key = \"\"\n")
            .unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());

        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.max_articles_per_topic, 8);
        assert_eq!(cfg.per_feed_cap, 3);
        assert_eq!(cfg.newsapi_key, None);
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);

        env::set_var("NEXUS_MAX_ARTICLES_PER_TOPIC", "12");
        env::set_var("NEWSAPI_KEY", "abc");
        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.max_articles_per_topic, 12);
        assert_eq!(cfg.newsapi_key.as_deref(), Some("abc"));
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn missing_file_means_defaults() {
        clear_env();
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg, AppConfig::default());
        clear_env();
    }
}
