use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
    #[serde(default)]
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Character budget for merged structural sections.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Token overlap used when re-splitting over-long sections.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Maximum tokens the model accepts per input.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Base URL override (OpenAI-compatible base or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            max_input_length: default_max_input_length(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_input_length() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
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
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Model requests allowed per conversation turn.
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,
    /// Prompt + completion tokens allowed per conversation turn.
    #[serde(default = "default_total_tokens_limit")]
    pub total_tokens_limit: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            request_limit: default_request_limit(),
            total_tokens_limit: default_total_tokens_limit(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_request_limit() -> u32 {
    2
}
fn default_total_tokens_limit() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Turn count at which an unresolved conversation is force-escalated.
    #[serde(default = "default_iteration_cap")]
    pub iteration_cap: u32,
    /// Number of trailing messages shown to the response generator.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_support_mention")]
    pub support_mention: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            iteration_cap: default_iteration_cap(),
            history_window: default_history_window(),
            product: default_product(),
            support_mention: default_support_mention(),
        }
    }
}

fn default_iteration_cap() -> u32 {
    9
}
fn default_history_window() -> usize {
    5
}
fn default_product() -> String {
    "Hummingbot".to_string()
}
fn default_support_mention() -> String {
    "@support-team".to_string()
}

/// Ordering of the delete and embed steps during a reindex.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReindexOrder {
    /// Embed new chunks first; old vectors survive an embedding failure.
    #[default]
    GenerateFirst,
    /// Delete old vectors before embedding.
    DeleteFirst,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReindexConfig {
    #[serde(default)]
    pub order: ReindexOrder,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    pub root: PathBuf,
    #[serde(default = "default_kb_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub include_deprecated: bool,
}

fn default_kb_categories() -> Vec<String> {
    vec!["Installation".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Name of an environment variable holding the HMAC request-signing secret.
    #[serde(default)]
    pub signing_secret_env: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            signing_secret_env: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    #[serde(default)]
    pub git: GitConnectorConfig,
    #[serde(default)]
    pub filesystem: FilesystemConnectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConnectorConfig {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// File names or suffixes skipped while walking a clone.
    #[serde(default = "default_git_ignore")]
    pub ignore: Vec<String>,
}

impl Default for GitConnectorConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ignore: default_git_ignore(),
        }
    }
}

fn default_git_ignore() -> Vec<String> {
    [".git", ".toml", ".lock", ".png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for FilesystemConnectorConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Config {
    /// A config with every section at its default, storing data at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            conversation: ConversationConfig::default(),
            reindex: ReindexConfig::default(),
            knowledge_base: None,
            server: ServerConfig::default(),
            connectors: ConnectorsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.embedding.max_input_length == 0 {
            bail!("embedding.max_input_length must be > 0");
        }
        if self.chunking.chunk_overlap >= self.embedding.max_input_length {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than embedding.max_input_length ({})",
                self.chunking.chunk_overlap,
                self.embedding.max_input_length
            );
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.conversation.iteration_cap < 1 {
            bail!("conversation.iteration_cap must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.request_limit < 1 {
            bail!("llm.request_limit must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
