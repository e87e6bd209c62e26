//! TOML configuration for the `arag` binary and HTTP server.
//!
//! Every section is optional; a missing section takes its defaults, so
//! [`Config::default`] describes a fully offline setup (no model, no
//! embeddings, empty corpus).
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [retrieval]
//! vector_weight = 0.7
//! lexical_weight = 0.3
//!
//! [workflow]
//! enable_reflection = true
//! max_iterations = 3
//!
//! [corpus]
//! root = "./docs"
//! ```

use agentic_rag_core::index::DEFAULT_EMBED_BATCH_SIZE;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Path tried when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/arag.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Passages sent per embedding request when the vector index is built.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    /// Fused results kept per retrieval task.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates requested from each index before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub enable_reflection: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Per-task timeout; unset means tasks may run indefinitely.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    /// Reflection scores below this trigger more research.
    #[serde(default = "default_reflection_threshold")]
    pub reflection_threshold: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enable_reflection: false,
            max_iterations: default_max_iterations(),
            task_timeout_secs: None,
            reflection_threshold: default_reflection_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
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

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    3
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_lexical_weight() -> f64 {
    0.3
}
fn default_top_k() -> usize {
    5
}
fn default_candidate_k() -> usize {
    20
}
fn default_max_iterations() -> u32 {
    3
}
fn default_reflection_threshold() -> f64 {
    0.6
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}
fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, else the default path if it exists, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Check cross-field constraints. Called by [`load_config`] and again after
/// CLI overrides are applied.
pub fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if !r.vector_weight.is_finite() || !r.lexical_weight.is_finite() {
        bail!("retrieval weights must be finite");
    }
    if r.vector_weight < 0.0 || r.lexical_weight < 0.0 {
        bail!("retrieval.vector_weight and retrieval.lexical_weight must be >= 0");
    }
    if r.vector_weight + r.lexical_weight <= 0.0 {
        bail!("retrieval weights must not both be zero");
    }
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if r.candidate_k < r.top_k {
        bail!(
            "retrieval.candidate_k ({}) must be >= retrieval.top_k ({})",
            r.candidate_k,
            r.top_k
        );
    }

    let w = &config.workflow;
    if w.max_iterations < 1 {
        bail!("workflow.max_iterations must be >= 1");
    }
    if !(0.0..=1.0).contains(&w.reflection_threshold) {
        bail!("workflow.reflection_threshold must be in [0.0, 1.0]");
    }
    if w.task_timeout_secs == Some(0) {
        bail!("workflow.task_timeout_secs must be > 0 when set");
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if config.embedding.batch_size < 1 {
        bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}
