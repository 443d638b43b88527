//! # Ragline RAG Pipeline
//!
//! Retrieval-augmented question answering over a local JSONL corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Question     │ --> │  Orchestrator   │ --> │     Answer      │
//! │  (+ history)    │     │ (prompt build)  │     │   + sources     │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                            │          │
//!                    ┌───────┴───┐  ┌───┴───────────┐
//!                    │  Vector   │  │  Transports   │
//!                    │  Index    │  │ (Native/REST) │
//!                    └───────────┘  └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use ragline_rag::{RagConfig, RagOrchestrator};
//!
//! let config = RagConfig::from_env();
//! let mut rag = RagOrchestrator::connect(config).await?;
//!
//! let response = rag.ask("Do dogs need vaccinations?", 5).await;
//! println!("{}", response.answer);
//! ```

mod config;
pub mod corpus;
mod embedding;
mod index;
mod orchestrator;
pub mod paths;
pub mod prompt;
mod session;

pub use config::{RagConfig, RagConfigBuilder, DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL};
pub use corpus::{load_jsonl, CorpusError};
pub use embedding::{create_embedder, Embedder, EmbeddingError, HashEmbedder, RemoteEmbedder};
pub use index::{
    cosine_similarity, extract_text, IndexError, IndexRecord, SearchResult, VectorIndex,
};
pub use orchestrator::{AskResponse, AskState, RagOrchestrator};
pub use prompt::{ModelProfile, PromptRegistry, DEFAULT_SYSTEM_PROMPT};
pub use session::{ChatSession, ChatTurn};

// Re-export backend types
pub use ragline_backend::{
    BackendClient, BackendError, ChatMessage, ModelRegistry, Role, TransportChain, TtlReaper,
    DEFAULT_HOST,
};
