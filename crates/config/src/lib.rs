//! Configuration loading, validation, and management for ragpipe.
//!
//! Loads configuration from `~/.ragpipe/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragpipe/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion and embedding provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Similarity-search backend
    #[serde(default)]
    pub index: IndexConfig,

    /// Per-caller admission control
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response / embedding / document caches
    #[serde(default)]
    pub cache: CacheConfig,

    /// Embedding batch aggregation
    #[serde(default)]
    pub batch: BatchConfig,

    /// Context assembly
    #[serde(default)]
    pub context: ContextConfig,

    /// Completion prompt budgeting
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on tokens requested for a single completion
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_response_tokens() -> u32 {
    4000
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "memory" or "qdrant"
    #[serde(default = "default_index_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_index_backend() -> String {
    "memory".into()
}
fn default_collection() -> String {
    "Fred".into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: None,
            api_key: None,
            collection: default_collection(),
        }
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("collection", &self.collection)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: usize,

    /// Minimum spacing between opportunistic sweeps of idle callers
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_requests_per_minute() -> usize {
    60
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_requests_per_minute(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Capacity and default TTL for one cache instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTierConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_response_tier", deserialize_with = "response_tier")]
    pub response: CacheTierConfig,

    #[serde(default = "default_embedding_tier", deserialize_with = "embedding_tier")]
    pub embedding: CacheTierConfig,

    #[serde(default = "default_document_tier", deserialize_with = "document_tier")]
    pub document: CacheTierConfig,
}

/// A tier table as written in the file; absent fields keep the tier's default.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TierOverrides {
    max_entries: Option<usize>,
    ttl_secs: Option<u64>,
}

impl TierOverrides {
    fn over(self, base: CacheTierConfig) -> CacheTierConfig {
        CacheTierConfig {
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            ttl_secs: self.ttl_secs.unwrap_or(base.ttl_secs),
        }
    }
}

fn response_tier<'de, D: Deserializer<'de>>(d: D) -> Result<CacheTierConfig, D::Error> {
    Ok(TierOverrides::deserialize(d)?.over(default_response_tier()))
}
fn embedding_tier<'de, D: Deserializer<'de>>(d: D) -> Result<CacheTierConfig, D::Error> {
    Ok(TierOverrides::deserialize(d)?.over(default_embedding_tier()))
}
fn document_tier<'de, D: Deserializer<'de>>(d: D) -> Result<CacheTierConfig, D::Error> {
    Ok(TierOverrides::deserialize(d)?.over(default_document_tier()))
}

fn default_response_tier() -> CacheTierConfig {
    CacheTierConfig {
        max_entries: 1000,
        ttl_secs: 3600,
    }
}
fn default_embedding_tier() -> CacheTierConfig {
    CacheTierConfig {
        max_entries: 5000,
        ttl_secs: 86400,
    }
}
fn default_document_tier() -> CacheTierConfig {
    CacheTierConfig {
        max_entries: 2000,
        ttl_secs: 86400,
    }
}
fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            response: default_response_tier(),
            embedding: default_embedding_tier(),
            document: default_document_tier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    #[serde(default = "default_embedding_max_wait_ms")]
    pub embedding_max_wait_ms: u64,
}

fn default_embedding_batch_size() -> usize {
    50
}
fn default_embedding_max_wait_ms() -> u64 {
    100
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: default_embedding_batch_size(),
            embedding_max_wait_ms: default_embedding_max_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_context_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_high_relevance_threshold")]
    pub high_relevance_threshold: f32,

    /// Hits requested from the index per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    #[serde(default = "default_truncation_buffer_tokens")]
    pub truncation_buffer_tokens: usize,
}

fn default_context_max_tokens() -> usize {
    8000
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_high_relevance_threshold() -> f32 {
    0.7
}
fn default_top_k() -> usize {
    10
}
fn default_max_expansions() -> usize {
    4
}
fn default_chars_per_token() -> usize {
    4
}
fn default_truncation_buffer_tokens() -> usize {
    50
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_context_max_tokens(),
            similarity_threshold: default_similarity_threshold(),
            high_relevance_threshold: default_high_relevance_threshold(),
            top_k: default_top_k(),
            max_expansions: default_max_expansions(),
            chars_per_token: default_chars_per_token(),
            truncation_buffer_tokens: default_truncation_buffer_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Hard ceiling for prompt + response, kept under the model's window
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,

    #[serde(default = "default_response_reserve_tokens")]
    pub response_reserve_tokens: usize,

    #[serde(default = "default_min_response_tokens")]
    pub min_response_tokens: usize,

    /// Most recent history messages carried into each completion
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,

    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Idle time after which a session's history is forgotten
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: u64,
}

fn default_max_total_tokens() -> usize {
    15000
}
fn default_response_reserve_tokens() -> usize {
    1000
}
fn default_min_response_tokens() -> usize {
    256
}
fn default_history_messages() -> usize {
    5
}
fn default_max_input_chars() -> usize {
    1000
}
fn default_history_ttl_secs() -> u64 {
    86400
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: default_max_total_tokens(),
            response_reserve_tokens: default_response_reserve_tokens(),
            min_response_tokens: default_min_response_tokens(),
            history_messages: default_history_messages(),
            max_input_chars: default_max_input_chars(),
            history_ttl_secs: default_history_ttl_secs(),
        }
    }
}

// --- Loading ---

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Also checks environment variables:
    /// - `RAGPIPE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RAGPIPE_MODEL`
    /// - `QDRANT_HOST`, `QDRANT_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injected for tests).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("RAGPIPE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("RAGPIPE_MODEL") {
            self.provider.model = model;
        }

        if let Some(host) = lookup("QDRANT_HOST") {
            self.index.url = Some(host);
            self.index.backend = "qdrant".into();
        }

        if let Some(key) = lookup("QDRANT_API_KEY") {
            self.index.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragpipe")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.index.backend.as_str(), "memory" | "qdrant") {
            return Err(ConfigError::ValidationError(format!(
                "index.backend must be \"memory\" or \"qdrant\", got \"{}\"",
                self.index.backend
            )));
        }

        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests_per_minute must be > 0".into(),
            ));
        }

        for (name, tier) in [
            ("response", &self.cache.response),
            ("embedding", &self.cache.embedding),
            ("document", &self.cache.document),
        ] {
            if tier.max_entries == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "cache.{name}.max_entries must be > 0"
                )));
            }
        }

        if self.batch.embedding_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch.embedding_batch_size must be > 0".into(),
            ));
        }

        for (name, value) in [
            ("similarity_threshold", self.context.similarity_threshold),
            ("high_relevance_threshold", self.context.high_relevance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "context.{name} must be between 0.0 and 1.0"
                )));
            }
        }

        if self.context.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token must be > 0".into(),
            ));
        }

        if self.prompt.history_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.history_ttl_secs must be > 0".into(),
            ));
        }

        if self.prompt.response_reserve_tokens + self.prompt.min_response_tokens
            >= self.prompt.max_total_tokens
        {
            return Err(ConfigError::ValidationError(
                "prompt.max_total_tokens leaves no room after the response reserve".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
