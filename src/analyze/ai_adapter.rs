//! AI adapter: provider abstraction + file cache + daily limit.
//! Providers return `None` on any failure; callers decide how to degrade.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ai::AiConfig;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// One completion request: a system instruction plus the user prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiResult {
    pub text: String,
}

pub type AiFuture<'a> = Pin<Box<dyn Future<Output = Option<AiResult>> + Send + 'a>>;

pub trait AiClient: Send + Sync {
    fn complete<'a>(&'a self, req: &'a AiRequest) -> AiFuture<'a>;
    /// Provider name for diagnostics/logs.
    fn provider_name(&self) -> &'static str;
    /// `false` only for the disabled client; callers skip the call entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Builds the client from `config/ai.json` (or `$NEXUS_AI_CONFIG_PATH`).
/// A missing or broken config disables the capability with a single warning.
pub fn build_ai_client() -> DynAiClient {
    match AiConfig::load_default() {
        Ok(cfg) => build_client_from_config(cfg.as_ref(), Some(default_cache_dir())),
        Err(e) => {
            tracing::warn!(error = ?e, "AI config unusable, model features disabled");
            build_client_from_config(None, None)
        }
    }
}

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if there is no config or `enabled == false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: Option<&AiConfig>, cache_dir: Option<PathBuf>) -> DynAiClient {
    let daily_limit = config.map(|c| c.daily_limit).unwrap_or(500);

    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider::reply("Résumé indisponible en mode test.");
        return Arc::new(CachingClient::new(mock, None, daily_limit));
    }

    let Some(cfg) = config.filter(|c| c.enabled) else {
        tracing::info!("AI disabled; summaries fall back, ranking keeps arrival order");
        return Arc::new(DisabledClient);
    };

    let timeout = Duration::from_secs(cfg.timeout_secs);
    let built: anyhow::Result<DynAiClient> = match cfg.provider.as_str() {
        "openai" => OpenAiProvider::new(&cfg.api_key, &cfg.model, timeout)
            .map(|p| Arc::new(CachingClient::new(p, cache_dir, daily_limit)) as DynAiClient),
        "gemini" => GeminiProvider::new(&cfg.api_key, &cfg.model, timeout)
            .map(|p| Arc::new(CachingClient::new(p, cache_dir, daily_limit)) as DynAiClient),
        other => Err(anyhow::anyhow!("unsupported provider {other}")),
    };
    match built {
        Ok(client) => {
            tracing::info!(provider = %cfg.provider, model = %cfg.model, "AI client ready");
            client
        }
        Err(e) => {
            tracing::warn!(error = ?e, "AI client construction failed, model features disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so we can reuse the same
/// caching wrapper for production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, req: &'a AiRequest) -> AiFuture<'a>;
    fn name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent("nexus-news-agent/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()?)
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("empty OpenAI api key");
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, req: &'a AiRequest) -> AiFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: &req.system,
                    },
                    Msg {
                        role: "user",
                        content: &req.prompt,
                    },
                ],
                temperature: 0.2,
                max_tokens: req.max_tokens,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| tracing::warn!(error = ?e, provider = "openai", "request failed"))
                .ok()?;

            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), provider = "openai", "non-success status");
                return None;
            }
            let parsed: Resp = resp.json().await.ok()?;
            let text = parsed.choices.first().map(|c| c.message.content.as_str())?;
            non_empty_result(text)
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Google Gemini `generateContent`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("empty Gemini api key");
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(&'a self, req: &'a AiRequest) -> AiFuture<'a> {
        Box::pin(async move {
            let body = serde_json::json!({
                "systemInstruction": { "parts": [{ "text": req.system }] },
                "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
                "generationConfig": { "temperature": 0.2, "maxOutputTokens": req.max_tokens },
            });

            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Content,
            }
            #[derive(Deserialize)]
            struct Content {
                #[serde(default)]
                parts: Vec<Part>,
            }
            #[derive(Deserialize)]
            struct Part {
                #[serde(default)]
                text: String,
            }

            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| tracing::warn!(error = ?e, provider = "gemini", "request failed"))
                .ok()?;

            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), provider = "gemini", "non-success status");
                return None;
            }
            let parsed: Resp = resp.json().await.ok()?;
            let text: String = parsed
                .candidates
                .first()?
                .content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect();
            non_empty_result(&text)
        })
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn non_empty_result(raw: &str) -> Option<AiResult> {
    let text = sanitize_completion(raw);
    (!text.is_empty()).then_some(AiResult { text })
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn complete<'a>(&'a self, _req: &'a AiRequest) -> AiFuture<'a> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(String),
    Fail,
    Hang,
}

/// Scripted provider for tests/local runs. Counts how often it was called.
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn reply(text: &str) -> Self {
        Self::with(MockBehavior::Reply(text.to_string()))
    }

    /// Every call fails as if the remote returned an error.
    pub fn failing() -> Self {
        Self::with(MockBehavior::Fail)
    }

    /// Every call never completes; exercises caller deadlines.
    pub fn hanging() -> Self {
        Self::with(MockBehavior::Hang)
    }

    fn with(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter; stays valid after the provider is moved into a client.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _req: &'a AiRequest) -> AiFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.clone();
        Box::pin(async move {
            match behavior {
                MockBehavior::Reply(text) => Some(AiResult { text }),
                MockBehavior::Fail => None,
                MockBehavior::Hang => std::future::pending().await,
            }
        })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Counter state is guarded by a `Mutex`. `cache_dir == None` disables the file cache.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: Option<PathBuf>,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: Option<PathBuf>, daily_limit_max: u32) -> Self {
        if let Some(dir) = &cache_dir {
            let _ = fs::create_dir_all(dir); // best-effort
        }
        let counter = cache_dir
            .as_deref()
            .and_then(|d| read_json::<DailyCounter>(&counter_path(d)))
            .unwrap_or_default();
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter: Arc::new(Mutex::new(counter)),
        }
    }

    fn save_counter(&self, dc: &DailyCounter) {
        if let Some(dir) = &self.cache_dir {
            if let Err(e) = write_json(&counter_path(dir), dc) {
                tracing::debug!(error = ?e, "AI daily counter not saved");
            }
        }
    }

    async fn complete_impl(&self, req: &AiRequest) -> Option<AiResult> {
        let key = cache_key(self.inner.name(), req);
        if let Some(hit) = self
            .cache_dir
            .as_deref()
            .and_then(|d| read_json::<AiResult>(&cache_path(d, &key)))
        {
            return Some(hit);
        }

        // Only real API calls count against the limit.
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.roll_over() {
                self.save_counter(&g);
            }
            if g.count >= self.daily_limit_max {
                tracing::warn!(provider = self.inner.name(), limit = self.daily_limit_max, "daily AI limit reached");
                return None;
            }
        }

        let mut fresh = self.inner.fetch(req).await?;
        fresh.text = sanitize_completion(&fresh.text);
        if fresh.text.is_empty() {
            return None;
        }
        if let Some(dir) = &self.cache_dir {
            if let Err(e) = write_json(&cache_path(dir, &key), &fresh) {
                tracing::debug!(error = ?e, "AI cache entry not written");
            }
        }
        let mut g = self.counter.lock().expect("poisoned counter");
        g.count = g.count.saturating_add(1);
        self.save_counter(&g);
        Some(fresh)
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn complete<'a>(&'a self, req: &'a AiRequest) -> AiFuture<'a> {
        Box::pin(self.complete_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

fn cache_key(provider: &str, req: &AiRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(req.system.as_bytes());
    hasher.update([0u8]);
    hasher.update(req.prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One JSON document per cache entry, named by its key.
fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let buf = fs::read(path).ok()?;
    serde_json::from_slice(&buf).ok()
}

/// Written to a sibling temp file first so readers never see a torn document.
fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter
// ------------------------------------------------------------

/// Real API calls made on `day` (UTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    day: NaiveDate,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            day: Utc::now().date_naive(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn roll_over(&mut self) -> bool {
        let today = Utc::now().date_naive();
        if self.day == today {
            return false;
        }
        self.day = today;
        self.count = 0;
        true
    }
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Collapse whitespace to single spaces and strip wrapping quotes / code fences.
pub fn sanitize_completion(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '"' || c == '`' || c == '\'')
        .trim()
        .to_string()
}
