use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Process-wide immutable configuration. Loaded once at startup by
/// [`load_config`]; prompt text and confidence constants are never
/// re-derived per request.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Minimum similarity for a candidate to clear the confidence gate.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Relaxed threshold for list-style intents, where filenames are
    /// enough and precision matters less.
    #[serde(default = "default_list_threshold")]
    pub list_similarity_threshold: f64,
    /// Candidates requested when searching the whole collection.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates requested when a single document is in scope — the
    /// search space is smaller, so there is headroom for more.
    #[serde(default = "default_top_k_scoped")]
    pub top_k_scoped: usize,
    /// Maximum sources kept per answer.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            list_similarity_threshold: default_list_threshold(),
            top_k: default_top_k(),
            top_k_scoped: default_top_k_scoped(),
            max_sources: default_max_sources(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}
fn default_list_threshold() -> f64 {
    0.35
}
fn default_top_k() -> usize {
    8
}
fn default_top_k_scoped() -> usize {
    12
}
fn default_max_sources() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Backend selector: `"openai"` or `"disabled"`.
    #[serde(default = "default_gen_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible backends.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Hard deadline for a single generation call.
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_gen_max_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_gen_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_gen_timeout_secs(),
            max_retries: default_gen_max_retries(),
        }
    }
}

fn default_gen_provider() -> String {
    "disabled".to_string()
}
fn default_gen_timeout_secs() -> u64 {
    120
}
fn default_gen_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Backend selector: `"openai"` or `"disabled"`.
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embed_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: None,
            dims: None,
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_embed_max_retries(),
        }
    }
}

fn default_embed_provider() -> String {
    "disabled".to_string()
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_embed_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// LRU bound on the in-memory tier.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_cache_max_entries() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Keep-alive cadence, independent of generation progress.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Hard deadline for the classification pass. On expiry the
    /// pipeline falls back to the default classification.
    #[serde(default = "default_classify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_classify_timeout_secs(),
        }
    }
}

fn default_classify_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.list_similarity_threshold) {
        anyhow::bail!("retrieval.list_similarity_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k == 0 || config.retrieval.top_k_scoped == 0 {
        anyhow::bail!("retrieval.top_k and retrieval.top_k_scoped must be > 0");
    }
    if config.retrieval.max_sources == 0 {
        anyhow::bail!("retrieval.max_sources must be > 0");
    }
    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be > 0");
    }
    if config.stream.heartbeat_secs == 0 {
        anyhow::bail!("stream.heartbeat_secs must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.generation.provider == "openai" && config.generation.model.is_none() {
        anyhow::bail!("generation.model must be specified when provider is 'openai'");
    }
    if config.generation.max_retries > 1 {
        anyhow::bail!("generation.max_retries must be 0 or 1 (failed generations are retried at most once)");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}
