//! Qdrant-backed semantic memory source

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::{
    client::{Payload, QdrantClient},
    qdrant::{
        CreateCollection, Distance, PointStruct, SearchPoints, VectorParams, VectorsConfig,
    },
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::embedding::Embedder;
use super::sources::{RetrievalError, ScoredSnippet, SemanticMemorySource};

/// Memory store configuration
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    pub collection_name: String,
    pub vector_size: usize,
    /// Results scoring below this are not worth a prompt slot
    pub score_threshold: f32,
    pub max_results: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            collection_name: "memories".to_string(),
            vector_size: 384,
            score_threshold: 0.35,
            max_results: 50,
        }
    }
}

/// Semantic memory store over a Qdrant collection
pub struct QdrantMemorySource {
    client: QdrantClient,
    embedder: Arc<dyn Embedder>,
    config: MemoryStoreConfig,
}

impl QdrantMemorySource {
    /// Create the source, bootstrapping the collection if missing
    pub async fn new(
        client: QdrantClient,
        embedder: Arc<dyn Embedder>,
        config: MemoryStoreConfig,
    ) -> Result<Self, RetrievalError> {
        let source = Self {
            client,
            embedder,
            config,
        };
        source.ensure_collection().await?;
        Ok(source)
    }

    async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| RetrievalError::Backend(format!("failed to list collections: {e}")))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.config.collection_name);

        if !exists {
            info!("Creating memory collection: {}", self.config.collection_name);

            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.config.collection_name.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(qdrant_client::qdrant::vectors_config::Config::Params(
                            VectorParams {
                                size: self.config.vector_size as u64,
                                distance: Distance::Cosine.into(),
                                ..Default::default()
                            },
                        )),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    RetrievalError::Backend(format!("failed to create collection: {e}"))
                })?;
        }

        Ok(())
    }

    /// Persist a memory snippet for later recall
    pub async fn remember(
        &self,
        text: &str,
        source_user_id: &str,
    ) -> Result<String, RetrievalError> {
        let vector = self.embedder.embed(text).await?;
        let id = Uuid::new_v4().to_string();

        let mut payload = Payload::new();
        payload.insert("text", text.to_string());
        payload.insert("source_user_id", source_user_id.to_string());
        payload.insert("stored_at", Utc::now().to_rfc3339());

        let point = PointStruct::new(id.clone(), vector, payload);

        self.client
            .upsert_points(&self.config.collection_name, None, vec![point], None)
            .await
            .map_err(|e| RetrievalError::Backend(format!("failed to store memory: {e}")))?;

        debug!(id, "memory stored");
        Ok(id)
    }
}

#[async_trait]
impl SemanticMemorySource for QdrantMemorySource {
    async fn recall(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredSnippet>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let limit = limit.min(self.config.max_results);

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.config.collection_name.clone(),
                vector,
                limit: limit as u64,
                with_payload: Some(true.into()),
                score_threshold: Some(self.config.score_threshold),
                ..Default::default()
            })
            .await
            .map_err(|e| RetrievalError::Backend(format!("failed to search memories: {e}")))?;

        let snippets: Vec<ScoredSnippet> = search_result
            .result
            .iter()
            .filter_map(|point| {
                let text = point.payload.get("text")?.as_str()?.to_string();
                let timestamp = point
                    .payload
                    .get("stored_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                Some(ScoredSnippet {
                    text,
                    relevance: point.score,
                    timestamp,
                })
            })
            .collect();

        debug!(query_len = query.len(), results = snippets.len(), "memories recalled");
        Ok(snippets)
    }
}
