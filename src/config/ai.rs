// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_AI_CONFIG_PATH: &str = "NEXUS_AI_CONFIG_PATH";
pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_timeout_secs() -> u64 {
    30
}
fn default_daily_limit() -> u32 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "gemini" (case-insensitive)
    pub provider: String,
    /// Empty means the provider default.
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY / GEMINI_API_KEY (by provider)
    pub api_key: String,
    /// Deadline for a single model call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        if cfg.model.trim().is_empty() {
            cfg.model = match cfg.provider.as_str() {
                "openai" => "gpt-4o-mini".to_string(),
                "gemini" => "gemini-1.5-flash".to_string(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "gemini" => env::var("GEMINI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing GEMINI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    /// `$NEXUS_AI_CONFIG_PATH`, else `config/ai.json`. `Ok(None)` when neither exists.
    pub fn load_default() -> anyhow::Result<Option<Self>> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_resolution_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(
            &p,
            r#"{"enabled": true, "provider": "Gemini", "api_key": "ENV", "timeout_secs": 0}"#,
        )
        .unwrap();

        env::set_var("GEMINI_API_KEY", "g-123");
        let cfg = AiConfig::load_from_file(&p).unwrap();
        assert_eq!(cfg.provider, "gemini");
        assert_eq!(cfg.api_key, "g-123");
        assert_eq!(cfg.model, "gemini-1.5-flash");
        assert_eq!(cfg.timeout_secs, 30);

        env::remove_var("GEMINI_API_KEY");
        assert!(AiConfig::load_from_file(&p).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(&p, r#"{"enabled": true, "provider": "acme", "api_key": "k"}"#).unwrap();
        assert!(AiConfig::load_from_file(&p).is_err());
    }
}
