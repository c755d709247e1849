use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_max_file_bytes() -> u64 {
    1_000_000
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

/// Strategy for the prose chunking path.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextSplitterKind {
    #[default]
    Semantic,
    Recursive,
}

/// How the semantic splitter turns adjacent-sentence distances into a cutoff.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointThreshold {
    #[default]
    StandardDeviation,
    Percentile,
    Interquartile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub text_splitter: TextSplitterKind,
    #[serde(default = "default_text_chunk_size")]
    pub text_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub text_chunk_overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    #[serde(default)]
    pub breakpoint_threshold_type: BreakpointThreshold,
    /// Defaults per threshold type when unset: 2.0 (std dev), 95.0
    /// (percentile), 1.5 (interquartile).
    #[serde(default)]
    pub breakpoint_threshold_amount: Option<f64>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_code_chunk_size")]
    pub code_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub code_chunk_overlap: usize,
    /// Force one language for every code file instead of detecting it
    /// from the extension.
    #[serde(default)]
    pub code_language: Option<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            text_splitter: TextSplitterKind::default(),
            text_chunk_size: default_text_chunk_size(),
            text_chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
            breakpoint_threshold_type: BreakpointThreshold::default(),
            breakpoint_threshold_amount: None,
            buffer_size: default_buffer_size(),
            code_chunk_size: default_code_chunk_size(),
            code_chunk_overlap: default_chunk_overlap(),
            code_language: None,
        }
    }
}

impl ChunkingConfig {
    pub fn threshold_amount(&self) -> f64 {
        self.breakpoint_threshold_amount
            .unwrap_or(match self.breakpoint_threshold_type {
                BreakpointThreshold::StandardDeviation => 2.0,
                BreakpointThreshold::Percentile => 95.0,
                BreakpointThreshold::Interquartile => 1.5,
            })
    }
}

fn default_text_chunk_size() -> usize {
    200
}
fn default_code_chunk_size() -> usize {
    300
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_buffer_size() -> usize {
    1
}
fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ".", " ", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "huggingface".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_retries() -> u32 {
    0
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
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
    PathBuf::from("vector_index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    /// Unset means no request timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_llm_retries(),
            timeout_secs: None,
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    1.5
}
fn default_llm_retries() -> u32 {
    2
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
    "127.0.0.1:8501".to_string()
}

pub const EMBEDDING_PROVIDERS: &[&str] = &["huggingface", "openai", "ollama", "local"];
pub const LLM_PROVIDERS: &[&str] = &["groq", "openai", "ollama"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks value ranges and provider names. Also applied to the built-in
/// defaults when no file is given.
pub fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    if c.text_chunk_size == 0 {
        anyhow::bail!("chunking.text_chunk_size must be > 0");
    }
    if c.text_chunk_overlap >= c.text_chunk_size {
        anyhow::bail!("chunking.text_chunk_overlap must be < chunking.text_chunk_size");
    }
    if c.code_chunk_size == 0 {
        anyhow::bail!("chunking.code_chunk_size must be > 0");
    }
    if c.code_chunk_overlap >= c.code_chunk_size {
        anyhow::bail!("chunking.code_chunk_overlap must be < chunking.code_chunk_size");
    }
    if c.separators.is_empty() {
        anyhow::bail!("chunking.separators must not be empty");
    }
    if c.breakpoint_threshold_type == BreakpointThreshold::Percentile
        && !(0.0..=100.0).contains(&c.threshold_amount())
    {
        anyhow::bail!("chunking.breakpoint_threshold_amount must be in [0, 100] for percentile");
    }
    if let Some(lang) = &c.code_language {
        if crate::chunk::Language::from_name(lang).is_none() {
            anyhow::bail!("Unknown chunking.code_language: '{}'", lang);
        }
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if !EMBEDDING_PROVIDERS.contains(&config.embedding.provider.as_str()) {
        anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be one of: {}.",
            config.embedding.provider,
            EMBEDDING_PROVIDERS.join(", ")
        );
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if !LLM_PROVIDERS.contains(&config.llm.provider.as_str()) {
        anyhow::bail!(
            "Unknown llm provider: '{}'. Must be one of: {}.",
            config.llm.provider,
            LLM_PROVIDERS.join(", ")
        );
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    Ok(())
}

pub const GITHUB_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Secrets read from the environment at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    pub github_token: String,
    pub embedding_key: Option<String>,
    pub llm_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &"<redacted>")
            .field("embedding_key", &self.embedding_key.as_ref().map(|_| "<redacted>"))
            .field("llm_key", &self.llm_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Environment variable holding the key for an embedding provider, if it needs one.
pub fn embedding_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "huggingface" => Some("HUGGINGFACEHUB_API_TOKEN"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

/// Environment variable holding the key for an LLM provider, if it needs one.
pub fn llm_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "groq" => Some("GROQ_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

impl Credentials {
    pub fn from_env(config: &Config) -> std::result::Result<Self, Error> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolves every credential the configured providers require. Blank
    /// values count as missing.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> std::result::Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| -> std::result::Result<String, Error> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    Error::Configuration(format!("{} environment variable not set", name))
                })
        };

        let github_token = require(GITHUB_TOKEN_VAR)?;
        let embedding_key = embedding_key_var(&config.embedding.provider)
            .map(require)
            .transpose()?;
        let llm_key = llm_key_var(&config.llm.provider)
            .map(require)
            .transpose()?;

        Ok(Self {
            github_token,
            embedding_key,
            llm_key,
        })
    }
}
