//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use ragline_backend::{DEFAULT_HOST, DEFAULT_REAPER_INTERVAL};

use crate::paths;

/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "qwen3-8b-mlx";

/// Default embedding model for the remote embedder.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text-v1.5";

/// Configuration for the RAG pipeline.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Backend base URL
    pub host: String,
    /// Chat model to answer with
    pub model: String,
    /// Embedding model (remote embedder only)
    pub embedding_model: String,
    /// Embedder backend: "hash" or "remote"
    pub embedding_backend: String,
    /// Embedding vector length
    pub embedding_dimension: usize,
    /// Persisted index file
    pub index_path: PathBuf,
    /// JSONL corpus file
    pub corpus_path: PathBuf,
    /// Documents retrieved per question
    pub top_k: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens in an answer
    pub max_tokens: i32,
    /// Past user/assistant exchanges replayed into each prompt
    pub exchange_window: usize,
    /// Turns kept in the chat history
    pub max_history: usize,
    /// Idle minutes before a model is evicted
    pub model_ttl_minutes: u64,
    /// How often the reaper sweeps
    pub reaper_interval: Duration,
    /// Timeout for non-streaming chat calls
    pub request_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_backend: "hash".to_string(),
            embedding_dimension: 768,
            index_path: paths::default_index_path(),
            corpus_path: paths::default_corpus_path(),
            top_k: 5,
            temperature: 0.2,
            max_tokens: 1024,
            exchange_window: 3,
            max_history: 10,
            model_ttl_minutes: 30,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl RagConfig {
    /// Create config from environment variables, defaulting everything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("LMSTUDIO_HOST").unwrap_or(defaults.host);
        let model = std::env::var("RAGLINE_MODEL").unwrap_or(defaults.model);
        let embedding_model =
            std::env::var("RAGLINE_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model);
        let embedding_backend =
            std::env::var("RAGLINE_EMBEDDER").unwrap_or(defaults.embedding_backend);

        let embedding_dimension = std::env::var("RAGLINE_EMBEDDING_DIM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.embedding_dimension);

        let index_path = std::env::var("RAGLINE_INDEX")
            .map(PathBuf::from)
            .unwrap_or(defaults.index_path);

        let corpus_path = std::env::var("RAGLINE_CORPUS")
            .map(PathBuf::from)
            .unwrap_or(defaults.corpus_path);

        let top_k = std::env::var("RAGLINE_TOP_K")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.top_k);

        let model_ttl_minutes = std::env::var("RAGLINE_MODEL_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.model_ttl_minutes);

        Self {
            host,
            model,
            embedding_model,
            embedding_backend,
            embedding_dimension,
            index_path,
            corpus_path,
            top_k,
            model_ttl_minutes,
            ..defaults
        }
    }

    /// Number of past turns replayed into a prompt.
    pub fn history_turns(&self) -> usize {
        self.exchange_window * 2
    }

    /// Turns kept in history, rounded down to whole user/assistant exchanges.
    pub fn history_limit(&self) -> usize {
        self.max_history - self.max_history % 2
    }

    /// Create a builder for configuration.
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for pipeline configuration.
#[derive(Debug, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    pub fn embedding_backend(mut self, backend: impl Into<String>) -> Self {
        self.config.embedding_backend = backend.into();
        self
    }

    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = dimension;
        self
    }

    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    pub fn corpus_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.corpus_path = path.into();
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, tokens: i32) -> Self {
        self.config.max_tokens = tokens;
        self
    }

    pub fn exchange_window(mut self, exchanges: usize) -> Self {
        self.config.exchange_window = exchanges;
        self
    }

    pub fn max_history(mut self, turns: usize) -> Self {
        self.config.max_history = turns;
        self
    }

    pub fn model_ttl_minutes(mut self, minutes: u64) -> Self {
        self.config.model_ttl_minutes = minutes;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> RagConfig {
        self.config
    }
}
