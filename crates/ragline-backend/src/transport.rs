//! Answer transports and the ordered fallback chain.
//!
//! ```text
//! ┌──────────────┐  fails  ┌──────────────┐  fails  ┌──────────────────┐
//! │   Native     │ ──────> │     REST     │ ──────> │ success = false  │
//! │ (/api/v0/*)  │         │ (/v1/chat/*) │         │ + error message  │
//! └──────────────┘         └──────────────┘         └──────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client::{BackendClient, ChatMessage, ChatRequest};
use crate::error::BackendError;
use crate::stream::ChatStream;

/// Per-chunk read timeout for streaming responses.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

/// A channel that can deliver a chat request to the backend.
#[async_trait]
pub trait AnswerTransport: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Send a request and wait for the full answer.
    async fn send(&self, request: &ChatRequest) -> Result<String, BackendError>;

    /// Send a request and stream the answer back.
    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, BackendError>;
}

/// LM Studio's native REST API.
///
/// Only constructed when the backend advertises it, see [`NativeTransport::connect`].
#[derive(Debug, Clone)]
pub struct NativeTransport {
    client: BackendClient,
    chunk_timeout: Duration,
}

impl NativeTransport {
    const CHAT_PATH: &'static str = "/api/v0/chat/completions";

    /// Probe the native API once; `None` when the backend does not offer it.
    pub async fn connect(client: BackendClient) -> Option<Self> {
        match client.native_models().await {
            Ok(models) => {
                info!(
                    "Native API available at {} ({} models)",
                    client.base_url(),
                    models.len()
                );
                Some(Self {
                    client,
                    chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
                })
            }
            Err(e) => {
                info!("Native API unavailable, using REST only: {}", e);
                None
            }
        }
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }
}

#[async_trait]
impl AnswerTransport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, BackendError> {
        self.client.chat(Self::CHAT_PATH, request).await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, BackendError> {
        self.client
            .chat_stream(Self::CHAT_PATH, request, self.chunk_timeout)
            .await
    }
}

/// OpenAI-compatible REST API.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: BackendClient,
    chunk_timeout: Duration,
}

impl RestTransport {
    const CHAT_PATH: &'static str = "/v1/chat/completions";

    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }
}

#[async_trait]
impl AnswerTransport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, BackendError> {
        self.client.chat(Self::CHAT_PATH, request).await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, BackendError> {
        self.client
            .chat_stream(Self::CHAT_PATH, request, self.chunk_timeout)
            .await
    }
}

/// Result of [`TransportChain::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub answer: String,
    pub success: bool,
    pub error: Option<String>,
    /// Transport that produced the answer.
    pub transport: Option<&'static str>,
}

impl SendOutcome {
    fn answered(answer: String, transport: &'static str) -> Self {
        Self {
            answer,
            success: true,
            error: None,
            transport: Some(transport),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            answer: String::new(),
            success: false,
            error: Some(error),
            transport: None,
        }
    }
}

/// Transports tried in order until one answers.
pub struct TransportChain {
    transports: Vec<Box<dyn AnswerTransport>>,
}

impl TransportChain {
    pub fn new(transports: Vec<Box<dyn AnswerTransport>>) -> Self {
        Self { transports }
    }

    /// Native (if the backend offers it) followed by REST, against one backend.
    pub async fn detect(client: BackendClient) -> Self {
        let mut transports: Vec<Box<dyn AnswerTransport>> = Vec::with_capacity(2);
        if let Some(native) = NativeTransport::connect(client.clone()).await {
            transports.push(Box::new(native));
        }
        transports.push(Box::new(RestTransport::new(client)));
        Self::new(transports)
    }

    /// Names of the configured transports, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Send through the chain. Never fails; failures are reported in the outcome.
    pub async fn send(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: i32,
    ) -> SendOutcome {
        let request = ChatRequest::new(model, messages)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        let mut failures = Vec::new();
        for transport in &self.transports {
            debug!("Sending via {} transport", transport.name());
            match transport.send(&request).await {
                Ok(answer) => return SendOutcome::answered(answer, transport.name()),
                Err(e) => {
                    warn!("{} transport failed: {}", transport.name(), e);
                    failures.push(format!("{}: {}", transport.name(), e));
                }
            }
        }

        SendOutcome::failed(Self::describe(failures))
    }

    /// Open a stream through the first transport that accepts the request.
    pub async fn stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: i32,
    ) -> Result<ChatStream, String> {
        let request = ChatRequest::new(model, messages)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        let mut failures = Vec::new();
        for transport in &self.transports {
            match transport.stream(&request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!("{} transport failed to stream: {}", transport.name(), e);
                    failures.push(format!("{}: {}", transport.name(), e));
                }
            }
        }

        Err(Self::describe(failures))
    }

    fn describe(failures: Vec<String>) -> String {
        if failures.is_empty() {
            "Error: no transport configured".to_string()
        } else {
            format!("Error: {}", failures.join("; "))
        }
    }
}

impl std::fmt::Debug for TransportChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChain")
            .field("transports", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Scripted {
        name: &'static str,
        answer: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AnswerTransport for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _request: &ChatRequest) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .ok_or_else(|| BackendError::Unavailable("scripted".to_string()))
        }

        async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, BackendError> {
            let answer = self.send(request).await?;
            Ok(ChatStream::from_chunks(vec![
                format!(
                    "data: {}\n",
                    serde_json::json!({"choices": [{"delta": {"content": answer}}]})
                ),
                "data: [DONE]\n".to_string(),
            ]))
        }
    }

    fn scripted(
        name: &'static str,
        answer: Option<&'static str>,
    ) -> (Box<dyn AnswerTransport>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Scripted {
            name,
            answer,
            calls: Arc::clone(&calls),
        };
        (Box::new(transport), calls)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn test_first_transport_wins() {
        let (native, native_calls) = scripted("native", Some("from native"));
        let (rest, rest_calls) = scripted("rest", Some("from rest"));
        let chain = TransportChain::new(vec![native, rest]);

        let outcome = chain.send("m", messages(), 0.2, 64).await;
        assert!(outcome.success);
        assert_eq!(outcome.answer, "from native");
        assert_eq!(outcome.transport, Some("native"));
        assert_eq!(native_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rest_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_rest() {
        let (native, _) = scripted("native", None);
        let (rest, rest_calls) = scripted("rest", Some("from rest"));
        let chain = TransportChain::new(vec![native, rest]);

        let outcome = chain.send("m", messages(), 0.2, 64).await;
        assert!(outcome.success);
        assert_eq!(outcome.answer, "from rest");
        assert_eq!(rest_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_fail_reports_each() {
        let (native, _) = scripted("native", None);
        let (rest, _) = scripted("rest", None);
        let chain = TransportChain::new(vec![native, rest]);

        let outcome = chain.send("m", messages(), 0.2, 64).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("native:"));
        assert!(error.contains("rest:"));
    }

    #[tokio::test]
    async fn test_empty_chain_fails_cleanly() {
        let chain = TransportChain::new(Vec::new());
        let outcome = chain.send("m", messages(), 0.2, 64).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_rest_500_without_native() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v0/models"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let chain = TransportChain::detect(BackendClient::with_url(server.uri())).await;
        assert_eq!(chain.names(), vec!["rest"]);

        let outcome = chain.send("m", messages(), 0.2, 64).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(!error.is_empty());
        assert!(error.contains("500"));
    }

    #[tokio::test]
    async fn test_detect_uses_native_when_advertised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v0/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "qwen3-8b-mlx", "state": "loaded"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "native answer"}}]
            })))
            .mount(&server)
            .await;

        let chain = TransportChain::detect(BackendClient::with_url(server.uri())).await;
        assert_eq!(chain.names(), vec!["native", "rest"]);

        let outcome = chain.send("qwen3-8b-mlx", messages(), 0.2, 64).await;
        assert_eq!(outcome.answer, "native answer");
        assert_eq!(outcome.transport, Some("native"));
    }

    #[tokio::test]
    async fn test_rest_stream_over_http() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\n\ndata: {{oops\n\ndata: [DONE]\n\n",
            serde_json::json!({"choices": [{"delta": {"content": "Rabies"}}]})
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let chain = TransportChain::new(vec![Box::new(RestTransport::new(
            BackendClient::with_url(server.uri()),
        ))]);
        let mut stream = chain.stream("m", messages(), 0.2, 64).await.unwrap();

        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next_fragment().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(fragments, vec!["Rabies".to_string()]);
        assert!(stream.saw_done());
    }

    #[tokio::test]
    async fn test_stream_falls_through() {
        let (native, _) = scripted("native", None);
        let (rest, _) = scripted("rest", Some("streamed"));
        let chain = TransportChain::new(vec![native, rest]);

        let stream = chain.stream("m", messages(), 0.2, 64).await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "streamed");
    }
}
