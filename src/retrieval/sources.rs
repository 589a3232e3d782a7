//! Retrieval source contracts
//!
//! Every external lookup feeding the ranker is best-effort: a failed or
//! timed-out source degrades to an empty result set and the message keeps
//! flowing. Errors here never propagate past the pipeline boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::metrics::METRICS;

/// A scored piece of text returned by a retrieval source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSnippet {
    pub text: String,
    /// Higher is more relevant; compared only within a category
    pub relevance: f32,
    pub timestamp: DateTime<Utc>,
}

impl ScoredSnippet {
    pub fn new(text: impl Into<String>, relevance: f32) -> Self {
        Self {
            text: text.into(),
            relevance,
            timestamp: Utc::now(),
        }
    }
}

/// Retrieval errors, consumed by the degrade-to-empty policy
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("source timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Semantic memory lookup over prior conversations
#[async_trait]
pub trait SemanticMemorySource: Send + Sync {
    /// Return up to `limit` memories relevant to `query`, best first
    async fn recall(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredSnippet>, RetrievalError>;
}

/// Fact-graph lookup for extracted user/world facts
#[async_trait]
pub trait FactSource: Send + Sync {
    /// Return up to `limit` facts relevant to `query`, best first
    async fn lookup(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredSnippet>, RetrievalError>;
}

/// Run a retrieval future under an independent timeout, degrading any
/// failure to an empty result set. `source` names the origin for logs and
/// metrics.
pub async fn fetch_or_empty<F>(source: &str, timeout: Duration, fut: F) -> Vec<ScoredSnippet>
where
    F: Future<Output = Result<Vec<ScoredSnippet>, RetrievalError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(snippets)) => snippets,
        Ok(Err(e)) => {
            warn!(source, error = %e, "retrieval source failed; degrading to empty results");
            METRICS.record_degraded_source(source, "error");
            Vec::new()
        }
        Err(_) => {
            warn!(source, ?timeout, "retrieval source timed out; degrading to empty results");
            METRICS.record_degraded_source(source, "timeout");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticMemory(Vec<ScoredSnippet>);

    #[async_trait]
    impl SemanticMemorySource for StaticMemory {
        async fn recall(
            &self,
            _query: &str,
            limit: usize,
        ) -> Result<Vec<ScoredSnippet>, RetrievalError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct FailingMemory;

    #[async_trait]
    impl SemanticMemorySource for FailingMemory {
        async fn recall(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<ScoredSnippet>, RetrievalError> {
            Err(RetrievalError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_or_empty_passes_results_through() {
        let source = StaticMemory(vec![
            ScoredSnippet::new("likes hiking", 0.9),
            ScoredSnippet::new("lives in Lisbon", 0.7),
        ]);
        let results = fetch_or_empty(
            "semantic_memory",
            Duration::from_secs(1),
            source.recall("hiking", 10),
        )
        .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_or_empty_degrades_on_error() {
        let source = FailingMemory;
        let results = fetch_or_empty(
            "semantic_memory",
            Duration::from_secs(1),
            source.recall("anything", 10),
        )
        .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_or_empty_degrades_on_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![ScoredSnippet::new("too late", 1.0)])
        };
        let results = fetch_or_empty("facts", Duration::from_millis(10), slow).await;
        assert!(results.is_empty());
    }
}
