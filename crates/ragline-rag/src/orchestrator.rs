//! RAG orchestrator - the main entry point for answering questions.

use std::sync::Arc;

use ragline_backend::{BackendClient, ChatMessage, ModelRegistry, Role, TransportChain};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingError};
use crate::index::{IndexError, SearchResult, VectorIndex};
use crate::prompt::{self, PromptRegistry};
use crate::session::ChatSession;

/// Where the orchestrator is in answering the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskState {
    Idle,
    Searching,
    Generating,
    Done,
    Failed,
}

/// Answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub success: bool,
}

/// Retrieval + history + generation for one conversation.
pub struct RagOrchestrator {
    config: RagConfig,
    model: String,
    registry: Arc<ModelRegistry>,
    index: Arc<VectorIndex>,
    transports: TransportChain,
    prompts: PromptRegistry,
    session: ChatSession,
    state: AskState,
}

impl RagOrchestrator {
    /// Create an orchestrator from its parts and claim the configured model.
    pub fn new(
        config: RagConfig,
        registry: Arc<ModelRegistry>,
        index: Arc<VectorIndex>,
        transports: TransportChain,
    ) -> Self {
        let model = config.model.clone();
        registry.load(&model, config.model_ttl_minutes);

        Self {
            config,
            model,
            registry,
            index,
            transports,
            prompts: PromptRegistry::with_defaults(),
            session: ChatSession::new(),
            state: AskState::Idle,
        }
    }

    /// Wire up registry, embedder, index and transports for `config.host`.
    ///
    /// Probes the backend once to decide whether the native transport is used.
    pub async fn connect(config: RagConfig) -> Result<Self, EmbeddingError> {
        let registry = Arc::new(ModelRegistry::new(config.host.clone()));
        let embedder = create_embedder(&config)?;
        let index = Arc::new(VectorIndex::new(config.index_path.clone(), embedder));

        let client =
            BackendClient::with_url(config.host.clone()).with_request_timeout(config.request_timeout);
        let transports = TransportChain::detect(client).await;
        info!("Using transports: {}", transports.names().join(" -> "));

        Ok(Self::new(config, registry, index, transports))
    }

    pub fn with_prompts(mut self, prompts: PromptRegistry) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn state(&self) -> AskState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch to another chat model and claim it in the registry.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        self.registry.load(&self.model, self.config.model_ttl_minutes);
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.index)
    }

    pub fn transports(&self) -> &TransportChain {
        &self.transports
    }

    /// Forget the conversation.
    pub fn reset(&mut self) {
        self.session.clear();
        self.state = AskState::Idle;
    }

    /// Answer `query` using the `k` most relevant documents.
    ///
    /// Never fails outright: problems come back with `success == false` and
    /// leave the chat history untouched.
    pub async fn ask(&mut self, query: &str, k: usize) -> AskResponse {
        info!("Answering question with model {}", self.model);

        let contexts = match self.retrieve(query, k).await {
            Ok(contexts) => contexts,
            Err(message) => return self.fail(message),
        };
        let messages = self.prepare_messages(query, &contexts);

        self.state = AskState::Generating;
        self.mark_used();

        let outcome = self
            .transports
            .send(
                &self.model,
                messages,
                self.config.temperature,
                self.config.max_tokens,
            )
            .await;

        if !outcome.success {
            return self.fail(
                outcome
                    .error
                    .unwrap_or_else(|| "Error: unknown transport failure".to_string()),
            );
        }

        debug!("Answered via {:?}", outcome.transport);
        self.commit(query, &outcome.answer);
        AskResponse {
            answer: outcome.answer,
            sources: contexts,
            success: true,
        }
    }

    /// Like [`RagOrchestrator::ask`], handing each text fragment to
    /// `on_fragment` as it arrives.
    ///
    /// History is only updated once the stream has finished without error.
    pub async fn ask_streaming<F>(&mut self, query: &str, k: usize, mut on_fragment: F) -> AskResponse
    where
        F: FnMut(&str),
    {
        let contexts = match self.retrieve(query, k).await {
            Ok(contexts) => contexts,
            Err(message) => return self.fail(message),
        };
        let messages = self.prepare_messages(query, &contexts);

        self.state = AskState::Generating;
        self.mark_used();

        let mut stream = match self
            .transports
            .stream(
                &self.model,
                messages,
                self.config.temperature,
                self.config.max_tokens,
            )
            .await
        {
            Ok(stream) => stream,
            Err(message) => return self.fail(message),
        };

        let mut answer = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            match fragment {
                Ok(text) => {
                    on_fragment(&text);
                    answer.push_str(&text);
                }
                Err(e) => return self.fail(format!("Error: {}", e)),
            }
        }

        if answer.is_empty() {
            return self.fail("Error: backend returned an empty answer".to_string());
        }

        self.commit(query, &answer);
        AskResponse {
            answer,
            sources: contexts,
            success: true,
        }
    }

    async fn retrieve(&mut self, query: &str, k: usize) -> Result<Vec<SearchResult>, String> {
        self.state = AskState::Searching;

        match self.index.search(query, k).await {
            Ok(results) => {
                if results.is_empty() {
                    warn!("No matching documents, answering without context");
                } else {
                    debug!("Retrieved {} context documents", results.len());
                }
                Ok(results)
            }
            Err(IndexError::NotLoaded(path)) => {
                warn!(
                    "No index at {}, answering without context",
                    path.display()
                );
                Ok(Vec::new())
            }
            Err(e @ (IndexError::DimensionMismatch { .. } | IndexError::Embedding(_))) => {
                warn!("Retrieval failed: {}", e);
                Err(format!("Error: {}", e))
            }
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                Err(format!(
                    "Error: {}. Rebuild the index with `ragline build-index`.",
                    e
                ))
            }
        }
    }

    fn prepare_messages(&self, query: &str, contexts: &[SearchResult]) -> Vec<ChatMessage> {
        let system_prompt = self.prompts.system_prompt_for(&self.model);
        let history = self.session.windowed(self.config.history_turns());
        prompt::build_messages(system_prompt, contexts, history, query)
    }

    /// Refresh the model's idle timer, re-claiming it if the reaper evicted it.
    fn mark_used(&self) {
        if self.registry.get(&self.model).is_some() {
            self.registry.touch(&self.model);
        } else {
            self.registry.load(&self.model, self.config.model_ttl_minutes);
        }
    }

    fn commit(&mut self, query: &str, answer: &str) {
        self.session.append(Role::User, query);
        self.session.append(Role::Assistant, answer);
        self.session.trim(self.config.history_limit());
        self.state = AskState::Done;
    }

    fn fail(&mut self, message: String) -> AskResponse {
        self.state = AskState::Failed;
        AskResponse {
            answer: message,
            sources: Vec::new(),
            success: false,
        }
    }
}

impl std::fmt::Debug for RagOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagOrchestrator")
            .field("model", &self.model)
            .field("state", &self.state)
            .field("history", &self.session.len())
            .field("transports", &self.transports.names())
            .finish()
    }
}
