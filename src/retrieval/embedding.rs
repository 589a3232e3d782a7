//! Embedding client for semantic memory lookups

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::sources::RetrievalError;

/// Embedder trait for turning query text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Dimensionality of produced vectors
    fn dimensions(&self) -> usize;
}

/// Configuration for the HTTP embedding service
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1/embeddings".to_string(),
            api_key: None,
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            timeout: Duration::from_secs(10),
        }
    }
}

/// OpenAI-compatible embedding service client
pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetrievalError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let mut req = self.client.post(&self.config.endpoint).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = req
            .send()
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Backend(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RetrievalError::Decode("no embedding in response".to_string()))?;

        debug!(dims = vector.len(), "query embedded");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_config_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.dimensions, 384);
        assert!(config.api_key.is_none());
    }

    #[tokio::test]
    async fn test_http_embedder_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#)
            .create_async()
            .await;

        let config = EmbeddingConfig {
            endpoint: format!("{}/v1/embeddings", server.url()),
            dimensions: 3,
            ..Default::default()
        };
        let embedder = HttpEmbedder::new(config).unwrap();
        let vector = embedder.embed("hello").await.unwrap();

        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_embedder_surfaces_backend_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let config = EmbeddingConfig {
            endpoint: format!("{}/v1/embeddings", server.url()),
            ..Default::default()
        };
        let embedder = HttpEmbedder::new(config).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Backend(_)));
    }
}
