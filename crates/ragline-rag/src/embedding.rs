//! Embedding functions used to build and query the vector index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::RagConfig;

/// Errors from an embedder.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("embedding response contained no vector")]
    Empty,
    #[error("embedder returned {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("unknown embedding backend '{0}' (expected 'hash' or 'remote')")]
    UnknownBackend(String),
    #[error("embedding dimension must be positive, got {0}")]
    InvalidDimension(usize),
}

/// Text to vector. Implementations must be deterministic: equal text gives
/// an equal vector, always of length [`Embedder::dimension`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

/// Offline embedder using signed feature hashing of lowercase word tokens.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Panics if `dimension` is zero; [`create_embedder`] rejects that for configured values.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Synchronous embedding, same result as [`Embedder::embed`].
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokens(text) {
            let (index, sign) = self.bucket(&token);
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::Empty)?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedder named by `config.embedding_backend`.
pub fn create_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    if config.embedding_dimension == 0 {
        return Err(EmbeddingError::InvalidDimension(0));
    }

    match config.embedding_backend.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.embedding_dimension))),
        "remote" => Ok(Arc::new(RemoteEmbedder::new(
            &config.host,
            &config.embedding_model,
            config.embedding_dimension,
        )?)),
        other => Err(EmbeddingError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(768);
        let a = embedder.embed("Dogs require rabies vaccination").await.unwrap();
        let b = embedder.embed("dogs REQUIRE rabies, vaccination!").await.unwrap();
        assert_eq!(a.len(), 768);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_is_normalized() {
        let vector = HashEmbedder::new(64).embed_sync("one two three");
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let vector = HashEmbedder::new(16).embed_sync("  ...  ");
        assert!(vector.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_create_embedder() {
        let config = RagConfig::builder().embedding_dimension(32).build();
        assert_eq!(create_embedder(&config).unwrap().dimension(), 32);

        let config = RagConfig::builder().embedding_backend("random").build();
        assert!(matches!(
            create_embedder(&config),
            Err(EmbeddingError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_create_embedder_rejects_zero_dimension() {
        for backend in ["hash", "remote"] {
            let config = RagConfig::builder()
                .embedding_backend(backend)
                .embedding_dimension(0)
                .build();
            assert!(matches!(
                create_embedder(&config),
                Err(EmbeddingError::InvalidDimension(0))
            ));
        }
    }

    #[tokio::test]
    async fn test_remote_embedder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text-v1.5"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "nomic-embed-text-v1.5", 3).unwrap();
        assert_eq!(embedder.embed("hi").await.unwrap(), vec![0.1, 0.2, 0.3]);

        let wrong = RemoteEmbedder::new(&server.uri(), "nomic-embed-text-v1.5", 4).unwrap();
        assert!(matches!(
            wrong.embed("hi").await,
            Err(EmbeddingError::Dimension {
                expected: 4,
                actual: 3
            })
        ));
    }
}
