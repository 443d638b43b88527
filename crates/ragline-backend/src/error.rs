//! Error types for inference backend operations.

use thiserror::Error;

/// Errors that can occur while talking to the inference backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Backend answered successfully but without a usable completion.
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Backend is not running or not reachable.
    #[error("Backend not reachable at {0}. Is LM Studio (or llama-server) running?")]
    Unavailable(String),

    /// Request or stream chunk timed out.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Streaming response broke off.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// Map a reqwest error, reporting connection failures as an unreachable backend.
    pub(crate) fn from_request(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_connect() {
            BackendError::Unavailable(base_url.to_string())
        } else {
            BackendError::Http(err)
        }
    }
}
