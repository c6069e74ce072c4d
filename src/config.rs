//! Configuration loading.
//!
//! Settings come from an optional TOML file; every field has a default so a
//! missing file is not an error. Environment variables override individual
//! keys afterwards (see [`Config::apply_env`]), which is how container
//! deployments usually configure the service.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding `index.json` and `metadata.json`.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `ollama` or `openai`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            url: default_ollama_url(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> f64 {
    30.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `mmr` or `similarity`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

fn default_mode() -> String {
    "mmr".to_string()
}
fn default_k() -> usize {
    6
}
fn default_fetch_k() -> usize {
    24
}
fn default_mmr_lambda() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_per_doc_chars")]
    pub per_doc_chars: usize,
    #[serde(default = "default_max_ctx_chars")]
    pub max_ctx_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            per_doc_chars: default_per_doc_chars(),
            max_ctx_chars: default_max_ctx_chars(),
        }
    }
}

fn default_per_doc_chars() -> usize {
    600
}
fn default_max_ctx_chars() -> usize {
    2400
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `ollama` (OpenAI-compatible local endpoint) or `openai` (hosted).
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Base URL of the local endpoint; `/v1` is appended.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_hosted_model")]
    pub hosted_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            url: default_ollama_url(),
            local_model: default_local_model(),
            hosted_model: default_hosted_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Model name for the selected provider.
    pub fn model(&self) -> &str {
        match self.provider.as_str() {
            "openai" => &self.hosted_model,
            _ => &self.local_model,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_local_model() -> String {
    "gemma3:1b".to_string()
}
fn default_hosted_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    256
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
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Apply environment-style overrides from `lookup`.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INDEX_DIR") {
            self.index.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("EMBEDDING_PROVIDER") {
            self.embedding.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            let url = v.trim_end_matches('/').to_string();
            self.embedding.url = url.clone();
            self.llm.url = url;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("RETRIEVAL_MODE") {
            self.retrieval.mode = v.to_lowercase();
        }
        if let Some(v) = lookup("TOP_K") {
            self.retrieval.k = parse_env("TOP_K", &v)?;
        }
        if let Some(v) = lookup("FETCH_K") {
            self.retrieval.fetch_k = parse_env("FETCH_K", &v)?;
        }
        if let Some(v) = lookup("MMR_LAMBDA") {
            self.retrieval.mmr_lambda = parse_env("MMR_LAMBDA", &v)?;
        }
        if let Some(v) = lookup("PER_DOC_CHARS") {
            self.prompt.per_doc_chars = parse_env("PER_DOC_CHARS", &v)?;
        }
        if let Some(v) = lookup("MAX_CTX_CHARS") {
            self.prompt.max_ctx_chars = parse_env("MAX_CTX_CHARS", &v)?;
        }
        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.local_model = v;
        }
        if let Some(v) = lookup("CHAT_MODEL") {
            self.llm.hosted_model = v;
        }
        if let Some(v) = lookup("LLM_TIMEOUT") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.llm.max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("BIND_ADDR") {
            self.server.bind = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        match self.embedding.provider.as_str() {
            "ollama" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be ollama or openai.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.timeout_secs <= 0.0 {
            bail!("embedding.timeout_secs must be > 0");
        }

        match self.retrieval.mode.as_str() {
            "mmr" | "similarity" => {}
            other => bail!(
                "Unknown retrieval mode: '{}'. Must be mmr or similarity.",
                other
            ),
        }
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            bail!("retrieval.fetch_k must be >= retrieval.k");
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
        }

        if self.prompt.per_doc_chars == 0 || self.prompt.max_ctx_chars == 0 {
            bail!("prompt.per_doc_chars and prompt.max_ctx_chars must be > 0");
        }

        match self.llm.provider.as_str() {
            "ollama" | "openai" => {}
            other => bail!("Unknown LLM provider: '{}'. Must be ollama or openai.", other),
        }
        if self.llm.timeout_secs <= 0.0 {
            bail!("llm.timeout_secs must be > 0");
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be > 0");
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, value, e))
}

/// Load configuration from `path` (if it exists), then the process environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
