//! HTTP client for the backend's OpenAI-compatible and native APIs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendError;
use crate::stream::ChatStream;
use crate::{DEFAULT_HOST, LIST_TIMEOUT};

/// Client for an LM Studio / llama-server style backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message in OpenAI format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: i32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.2,
            max_tokens: 1024,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Copy of this request with the `stream` flag set.
    pub(crate) fn streaming(&self) -> Self {
        Self {
            stream: true,
            ..self.clone()
        }
    }
}

/// OpenAI-compatible chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One model advertised by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendModel {
    pub id: String,
    #[serde(default)]
    pub loaded: Option<bool>,
    /// Native API reports `"loaded"` / `"not-loaded"` here instead of `loaded`.
    #[serde(default)]
    pub state: Option<String>,
}

impl BackendModel {
    pub fn is_loaded(&self) -> bool {
        self.loaded
            .unwrap_or_else(|| self.state.as_deref() == Some("loaded"))
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<BackendModel>,
}

impl BackendClient {
    /// Create a new client with the default URL (localhost:1234).
    pub fn new() -> Self {
        Self::with_url(DEFAULT_HOST)
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Create a new client with a custom port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", port))
    }

    /// Set the timeout applied to non-streaming chat calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List models via the OpenAI-compatible `/v1/models` endpoint.
    pub async fn list_models(&self) -> Result<Vec<BackendModel>, BackendError> {
        self.get_models("/v1/models").await
    }

    /// List models via the native `/api/v0/models` endpoint.
    pub async fn native_models(&self) -> Result<Vec<BackendModel>, BackendError> {
        self.get_models("/api/v0/models").await
    }

    async fn get_models(&self, path: &str) -> Result<Vec<BackendModel>, BackendError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Unavailable(self.base_url.clone())
                } else {
                    BackendError::from_request(e, &self.base_url)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let list: ModelList = response.json().await?;
        Ok(list.data)
    }

    /// Send a non-streaming chat completion to `path` and return the answer text.
    pub async fn chat(&self, path: &str, request: &ChatRequest) -> Result<String, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} (model {})", url, request.model);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.request_timeout)
                } else {
                    BackendError::from_request(e, &self.base_url)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::EmptyResponse("No completion returned".to_string()))
    }

    /// Open a streaming chat completion on `path`.
    ///
    /// There is no overall deadline; waiting for the response headers and
    /// every chunk read are each bounded by `chunk_timeout`.
    pub async fn chat_stream(
        &self,
        path: &str,
        request: &ChatRequest,
        chunk_timeout: Duration,
    ) -> Result<ChatStream, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} (streaming, model {})", url, request.model);

        let send = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.streaming())
            .send();
        let response = tokio::time::timeout(chunk_timeout, send)
            .await
            .map_err(|_| BackendError::Timeout(chunk_timeout))?
            .map_err(|e| BackendError::from_request(e, &self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(ChatStream::new(response.bytes_stream(), chunk_timeout))
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}
