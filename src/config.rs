use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
///
/// Defaults are usable offline: with no store URLs configured the pipeline
/// runs against in-memory adapters, and the mock provider needs no key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stores: StoreConfig,
    pub ai: AiConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
}

/// Backing store endpoints. `None` selects the in-memory adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Vector store base URL (Chroma-style REST endpoint).
    pub vector_url: Option<String>,
    /// Document store base URL (JSON REST endpoint).
    pub document_url: Option<String>,
    /// Per-request store timeout in milliseconds.
    pub timeout_ms: u64,
}

/// AI provider configuration (keys, endpoints, call options).
///
/// API keys are read from the environment, never persisted to the
/// config file on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// Local provider (Ollama-compatible) endpoint.
    pub ollama_url: String,
    pub ollama_model: String,
    /// Sampling temperature for identification calls.
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub retries: u32,
    /// Outbound concurrency per provider.
    pub max_concurrency: usize,
    /// Cache identical (operation, content, options) calls.
    pub cache: bool,
}

/// Extraction pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parallel page workers within a stage. 0 means min(8, page_count).
    pub max_page_workers: usize,
    /// Above this page count the worker cap drops to 4 to bound memory.
    pub large_document_pages: usize,
    /// Character ceiling for the identification text sample.
    pub identify_char_ceiling: usize,
    /// Optional per-stage soft deadline in seconds.
    pub stage_deadline_secs: Option<u64>,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reject uploads larger than this many bytes.
    pub upload_max_bytes: u64,
    /// Idle sessions past this age are swept (never while running).
    pub ttl_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stores: StoreConfig::default(),
            ai: AiConfig::default(),
            pipeline: PipelineConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            openai_api_key: None,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            timeout_ms: 30_000,
            retries: 3,
            max_concurrency: 4,
            cache: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_page_workers: 0,
            large_document_pages: 400,
            identify_char_ceiling: 5_000,
            stage_deadline_secs: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            upload_max_bytes: 200 * 1024 * 1024,
            ttl_seconds: 3600,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(if self.timeout_ms == 0 {
            10_000
        } else {
            self.timeout_ms
        })
    }
}

impl AppConfig {
    /// Load configuration: `~/.config/rpger/config.toml` if present,
    /// then environment variable overrides. Missing or unparseable files
    /// fall back to defaults.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env();
        config
    }

    fn load_file() -> Self {
        let config_path = Self::config_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config at {}: {e} — using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Apply recognized environment variables on top of the loaded file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("VECTOR_STORE_URL") {
            if !v.is_empty() {
                self.stores.vector_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("DOCUMENT_STORE_URL") {
            if !v.is_empty() {
                self.stores.document_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            if !v.is_empty() {
                self.ai.anthropic_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.ai.openai_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("OLLAMA_URL") {
            if !v.is_empty() {
                self.ai.ollama_url = v;
            }
        }
        if let Ok(v) = std::env::var("OLLAMA_MODEL") {
            if !v.is_empty() {
                self.ai.ollama_model = v;
            }
        }
        if let Some(v) = env_parse::<f32>("AI_TEMPERATURE") {
            self.ai.temperature = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_parse::<u32>("AI_MAX_TOKENS") {
            self.ai.max_tokens = v.max(256);
        }
        if let Some(v) = env_parse::<u64>("AI_TIMEOUT_MS") {
            self.ai.timeout_ms = v.max(1000);
        }
        if let Some(v) = env_parse::<u32>("AI_RETRIES") {
            self.ai.retries = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_PAGE_WORKERS") {
            self.pipeline.max_page_workers = v;
        }
        if let Some(v) = env_parse::<u64>("UPLOAD_MAX_BYTES") {
            self.session.upload_max_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("SESSION_TTL_SECONDS") {
            self.session.ttl_seconds = v;
        }
    }

    /// Effective page-worker cap for a document of `page_count` pages.
    pub fn page_workers(&self, page_count: usize) -> usize {
        let configured = if self.pipeline.max_page_workers == 0 {
            8.min(page_count.max(1))
        } else {
            self.pipeline.max_page_workers.min(page_count.max(1))
        };
        if page_count > self.pipeline.large_document_pages {
            configured.min(4)
        } else {
            configured
        }
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai.timeout_ms)
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("rpger").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ai.max_tokens, 4000);
        assert_eq!(config.ai.retries, 3);
        assert_eq!(config.session.upload_max_bytes, 200 * 1024 * 1024);
        assert_eq!(config.session.ttl_seconds, 3600);
        assert!(config.stores.vector_url.is_none());
    }

    #[test]
    fn test_page_workers_default() {
        let config = AppConfig::default();
        assert_eq!(config.page_workers(124), 8);
        assert_eq!(config.page_workers(3), 3);
        assert_eq!(config.page_workers(0), 1);
    }

    #[test]
    fn test_page_workers_large_document() {
        let config = AppConfig::default();
        // Above the large-document threshold the cap drops to 4.
        assert_eq!(config.page_workers(500), 4);
    }

    #[test]
    fn test_page_workers_explicit() {
        let mut config = AppConfig::default();
        config.pipeline.max_page_workers = 2;
        assert_eq!(config.page_workers(124), 2);
        assert_eq!(config.page_workers(500), 2);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.ai.max_tokens, config.ai.max_tokens);
        assert_eq!(deserialized.session.ttl_seconds, config.session.ttl_seconds);
    }
}
