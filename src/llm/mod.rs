//! AI provider abstraction.
//!
//! One capability trait with four implementations:
//! - `mock`: deterministic, catalog-driven; always registered and used as
//!   the last-resort fallback
//! - `claude`: Anthropic messages API
//! - `openai`: OpenAI chat completions
//! - `ollama`: local Ollama-compatible endpoint
//!
//! All variants produce structurally identical outputs. `ProviderClient`
//! wraps every call with a concurrency semaphore, timeout, retries with
//! jittered exponential backoff, and an LRU response cache.

mod claude;
mod mock;
mod ollama;
mod openai;
mod types;

pub use claude::ClaudeProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use types::{
    parse_json_payload, CategoryVerdict, CharacterPass, CharacterProfile, CharacterQuote,
    CharacterSet, IdentifyOutcome,
};

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

use crate::catalog::{ContentKind, GameCatalog};
use crate::config::AiConfig;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum AiError {
    /// The provider answered, but not with the agreed structure.
    #[error("malformed provider output: {0}")]
    Malformed(String),

    /// Network-level failure reaching the provider.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider call timed out")]
    Timeout,

    /// Missing or rejected credentials.
    #[error("provider unauthorized: {0}")]
    Unauthorized(String),
}

impl AiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "ai_malformed",
            Self::Unreachable(_) => "ai_unreachable",
            Self::Timeout => "ai_timeout",
            Self::Unauthorized(_) => "provider_unauthorized",
        }
    }

    /// Whether a retry can plausibly change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

pub type AiResult<T> = Result<T, AiError>;

// ============================================================================
// Options
// ============================================================================

/// Per-call options. Defaults follow the operation: identification runs at
/// temperature 0.1, categorization at 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub retries: u32,
    pub cache: bool,
}

impl CallOptions {
    pub fn identify() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4000,
            timeout: Duration::from_millis(30_000),
            retries: 3,
            cache: true,
        }
    }

    pub fn categorize() -> Self {
        Self { temperature: 0.0, ..Self::identify() }
    }

    /// Apply configured overrides on top of operation defaults.
    pub fn with_config(mut self, config: &AiConfig) -> Self {
        self.max_tokens = config.max_tokens.max(256);
        self.timeout = Duration::from_millis(config.timeout_ms.max(1000));
        self.retries = config.retries;
        self.cache = config.cache;
        self
    }

    fn fingerprint(&self) -> String {
        format!(
            "t{:.3}:m{}:r{}",
            self.temperature, self.max_tokens, self.retries
        )
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    Ok,
    Degraded,
    Down,
}

impl ProviderHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

// ============================================================================
// Capability trait
// ============================================================================

/// The provider capability. One trait, two call-sites (identification and
/// categorization) that differ only in prompt and result schema, plus the
/// novel character pass.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short machine id ("mock", "claude", "openai", "ollama").
    fn id(&self) -> &'static str;

    /// Produce a classification verdict partial from a document sample.
    async fn identify(
        &self,
        text: &str,
        kind: ContentKind,
        options: &CallOptions,
    ) -> AiResult<IdentifyOutcome>;

    /// Categorize one section against an allowed category list.
    async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[String],
        options: &CallOptions,
    ) -> AiResult<CategoryVerdict>;

    /// Character extraction over novel text (page-marked chunks).
    async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPass,
        prior: Option<&CharacterSet>,
        options: &CallOptions,
    ) -> AiResult<CharacterSet>;

    /// Liveness/credential probe.
    async fn health(&self) -> ProviderHealth;
}

// ============================================================================
// Provider kinds and factory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mock,
    Claude,
    OpenAi,
    Ollama,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Some(Self::Mock),
            "claude" | "anthropic" => Some(Self::Claude),
            "openai" => Some(Self::OpenAi),
            "ollama" | "local" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn all() -> [ProviderKind; 4] {
        [Self::Mock, Self::Claude, Self::OpenAi, Self::Ollama]
    }
}

/// Construct a provider by kind. The mock needs the catalog; the cloud
/// providers take their keys from the config.
pub fn create_provider(
    kind: ProviderKind,
    config: &AiConfig,
    catalog: Arc<GameCatalog>,
) -> Arc<dyn AiProvider> {
    match kind {
        ProviderKind::Mock => Arc::new(MockProvider::new(catalog)),
        ProviderKind::Claude => Arc::new(ClaudeProvider::new(
            config.anthropic_api_key.clone().unwrap_or_default(),
        )),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            config.openai_api_key.clone().unwrap_or_default(),
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        )),
    }
}

// ============================================================================
// Client wrapper: semaphore + timeout + retry + cache
// ============================================================================

const BACKOFF_BASE_MS: u64 = 500;
const CACHE_CAPACITY: usize = 512;

/// Wraps a provider with the shared call discipline.
pub struct ProviderClient {
    provider: Arc<dyn AiProvider>,
    semaphore: Arc<Semaphore>,
    cache: Mutex<LruCache<String, serde_json::Value>>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn AiProvider>, max_concurrency: usize) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity"),
            )),
        }
    }

    pub fn id(&self) -> &'static str {
        self.provider.id()
    }

    pub fn provider(&self) -> &Arc<dyn AiProvider> {
        &self.provider
    }

    pub async fn health(&self) -> ProviderHealth {
        self.provider.health().await
    }

    pub async fn identify(
        &self,
        text: &str,
        kind: ContentKind,
        options: &CallOptions,
    ) -> AiResult<IdentifyOutcome> {
        let key = self.cache_key("identify", text, options);
        if let Some(hit) = self.cache_get(&key, options).await {
            return serde_json::from_value(hit).map_err(|e| AiError::Malformed(e.to_string()));
        }
        let provider = Arc::clone(&self.provider);
        let text = text.to_string();
        let result = self
            .call(options, move |opts| {
                let provider = Arc::clone(&provider);
                let text = text.clone();
                async move { provider.identify(&text, kind, &opts).await }
            })
            .await?;
        self.cache_put(&key, options, &result).await;
        Ok(result)
    }

    pub async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[String],
        options: &CallOptions,
    ) -> AiResult<CategoryVerdict> {
        let key = self.cache_key("categorize", section_text, options);
        if let Some(hit) = self.cache_get(&key, options).await {
            return serde_json::from_value(hit).map_err(|e| AiError::Malformed(e.to_string()));
        }
        let provider = Arc::clone(&self.provider);
        let text = section_text.to_string();
        let categories = allowed_categories.to_vec();
        let result = self
            .call(options, move |opts| {
                let provider = Arc::clone(&provider);
                let text = text.clone();
                let categories = categories.clone();
                async move { provider.categorize(&text, &categories, &opts).await }
            })
            .await?;
        self.cache_put(&key, options, &result).await;
        Ok(result)
    }

    pub async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPass,
        prior: Option<&CharacterSet>,
        options: &CallOptions,
    ) -> AiResult<CharacterSet> {
        let provider = Arc::clone(&self.provider);
        let text = novel_text.to_string();
        let prior = prior.cloned();
        self.call(options, move |opts| {
            let provider = Arc::clone(&provider);
            let text = text.clone();
            let prior = prior.clone();
            async move {
                provider
                    .extract_characters(&text, pass, prior.as_ref(), &opts)
                    .await
            }
        })
        .await
    }

    /// Shared call path: acquire a permit, then attempt with timeout and
    /// jittered exponential backoff. Malformed output and auth failures are
    /// not retried.
    async fn call<T, F, Fut>(&self, options: &CallOptions, attempt: F) -> AiResult<T>
    where
        F: Fn(CallOptions) -> Fut,
        Fut: std::future::Future<Output = AiResult<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AiError::Unreachable("provider client closed".to_string()))?;

        let mut last = AiError::Unreachable("no attempt made".to_string());
        for attempt_no in 0..=options.retries {
            match tokio::time::timeout(options.timeout, attempt(options.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() && attempt_no < options.retries => {
                    last = e;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) if attempt_no < options.retries => {
                    last = AiError::Timeout;
                }
                Err(_) => return Err(AiError::Timeout),
            }

            let backoff = BACKOFF_BASE_MS * (1u64 << attempt_no.min(6));
            let jitter = rand::thread_rng().gen_range(0.8..1.2);
            tokio::time::sleep(Duration::from_millis((backoff as f64 * jitter) as u64)).await;
        }
        Err(last)
    }

    fn cache_key(&self, operation: &str, content: &str, options: &CallOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!(
            "{}:{}:{}:{}",
            self.provider.id(),
            operation,
            hex::encode(hasher.finalize()),
            options.fingerprint()
        )
    }

    async fn cache_get(&self, key: &str, options: &CallOptions) -> Option<serde_json::Value> {
        if !options.cache {
            return None;
        }
        self.cache.lock().await.get(key).cloned()
    }

    async fn cache_put<T: serde::Serialize>(&self, key: &str, options: &CallOptions, value: &T) {
        if !options.cache {
            return;
        }
        if let Ok(v) = serde_json::to_value(value) {
            self.cache.lock().await.put(key.to_string(), v);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
