//! HTTP client for the external emotion-analysis service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AffectAnnotation, EmotionAnnotator};
use crate::retrieval::sources::RetrievalError;

/// Configuration for HTTP annotator clients
#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8090/v1/emotion".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

/// Emotion annotator backed by an HTTP classification service
pub struct HttpEmotionAnnotator {
    client: Client,
    config: AnnotatorConfig,
}

impl HttpEmotionAnnotator {
    pub fn new(config: AnnotatorConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetrievalError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmotionAnnotator for HttpEmotionAnnotator {
    async fn annotate(&self, text: &str) -> Result<AffectAnnotation, RetrievalError> {
        let request = EmotionRequest {
            text: text.to_string(),
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for emotion annotation", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&request);
            if let Some(ref api_key) = self.config.api_key {
                req = req.header("Authorization", format!("Bearer {api_key}"));
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error =
                            Some(RetrievalError::Backend(format!("HTTP {status}: {body}")));
                        continue;
                    }

                    match response.json::<EmotionResponse>().await {
                        Ok(resp) => {
                            debug!(label = %resp.label, "emotion annotated");
                            return Ok(AffectAnnotation::new(
                                resp.label,
                                resp.intensity,
                                resp.confidence,
                            ));
                        }
                        Err(e) => {
                            last_error = Some(RetrievalError::Decode(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(RetrievalError::Backend(e.to_string()));
                }
            }
        }

        warn!(
            "Emotion annotation failed after {} attempts",
            self.config.max_retries
        );
        Err(last_error
            .unwrap_or_else(|| RetrievalError::Backend("no attempts made".to_string())))
    }
}

#[derive(Debug, Serialize)]
struct EmotionRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmotionResponse {
    label: String,
    intensity: f32,
    confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotator_config_default() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.api_key.is_none());
    }

    #[tokio::test]
    async fn test_annotate_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/emotion")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"label":"joy","intensity":0.8,"confidence":0.95}"#)
            .create_async()
            .await;

        let config = AnnotatorConfig {
            endpoint: format!("{}/v1/emotion", server.url()),
            max_retries: 1,
            ..Default::default()
        };
        let annotator = HttpEmotionAnnotator::new(config).unwrap();
        let annotation = annotator.annotate("I got the job!").await.unwrap();

        assert_eq!(annotation.label, "joy");
        assert!((annotation.intensity - 0.8).abs() < f32::EPSILON);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_annotate_retries_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/emotion")
            .with_status(503)
            .with_body("unavailable")
            .expect(2)
            .create_async()
            .await;

        let config = AnnotatorConfig {
            endpoint: format!("{}/v1/emotion", server.url()),
            max_retries: 2,
            ..Default::default()
        };
        let annotator = HttpEmotionAnnotator::new(config).unwrap();
        let err = annotator.annotate("hello").await.unwrap_err();

        assert!(matches!(err, RetrievalError::Backend(_)));
        mock.assert_async().await;
    }
}
