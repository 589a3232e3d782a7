//! Per-message context pipeline
//!
//! One invocation per inbound message: fan out to the retrieval sources and
//! annotators concurrently (each under its own timeout, each degrading to
//! nothing on failure), merge the results into a candidate pool, then run
//! the synchronous assembly steps. Invocations share no mutable state, so
//! conversations process in parallel with no coordination, and abandoning a
//! cancelled request costs nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::annotators::{
    emotion_candidate, relationship_candidate, EmotionAnnotator, RelationshipAnnotator,
};
use crate::character::IdentityProvider;
use crate::config::Config;
use crate::context::assembler::ConversationAssembler;
use crate::context::models::{
    Budget, CandidateContent, ConversationTurn, FinalPrompt, TurnRole,
};
use crate::context::token_estimator::{CharsPerTokenEstimator, TokenEstimator};
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use crate::retrieval::ranker::RetrievalRanker;
use crate::retrieval::sources::{fetch_or_empty, FactSource, SemanticMemorySource};

/// One inbound message plus the conversation it belongs to
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub user_id: String,
    pub message: String,
    /// Recent window of the conversation, oldest first
    pub history: Vec<ConversationTurn>,
}

/// Orchestrates retrieval fan-out and prompt assembly for each message
pub struct ContextPipeline {
    config: Config,
    estimator: Arc<dyn TokenEstimator>,
    identity: Arc<dyn IdentityProvider>,
    memory: Option<Arc<dyn SemanticMemorySource>>,
    facts: Option<Arc<dyn FactSource>>,
    emotion: Option<Arc<dyn EmotionAnnotator>>,
    relationship: Option<Arc<dyn RelationshipAnnotator>>,
    ranker: RetrievalRanker,
    assembler: ConversationAssembler,
}

impl ContextPipeline {
    pub fn new(config: Config, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        config.budget.validate()?;
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(CharsPerTokenEstimator::new(config.budget.chars_per_token));

        let budget =
            Budget::from_fraction(config.budget.max_tokens, config.budget.system_budget_fraction)?;
        let assembler = ConversationAssembler::new(
            budget,
            config.budget.min_recent_messages,
            config.budget.enable_emergency_truncation,
            Arc::clone(&estimator),
        );
        let ranker = RetrievalRanker::new(Arc::clone(&estimator));

        Ok(Self {
            config,
            estimator,
            identity,
            memory: None,
            facts: None,
            emotion: None,
            relationship: None,
            ranker,
            assembler,
        })
    }

    pub fn with_memory_source(mut self, source: Arc<dyn SemanticMemorySource>) -> Self {
        self.memory = Some(source);
        self
    }

    pub fn with_fact_source(mut self, source: Arc<dyn FactSource>) -> Self {
        self.facts = Some(source);
        self
    }

    pub fn with_emotion_annotator(mut self, annotator: Arc<dyn EmotionAnnotator>) -> Self {
        self.emotion = Some(annotator);
        self
    }

    pub fn with_relationship_annotator(
        mut self,
        annotator: Arc<dyn RelationshipAnnotator>,
    ) -> Self {
        self.relationship = Some(annotator);
        self
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Assemble the bounded prompt for one inbound message.
    ///
    /// Fails only on configuration problems (no identity, impossible budget
    /// split). Retrieval and annotation failures degrade to an emptier but
    /// valid prompt.
    pub async fn process(&self, request: &MessageRequest) -> Result<FinalPrompt> {
        let identity_candidates = self.identity.identity_candidates(self.estimator.as_ref());
        if identity_candidates.is_empty()
            || identity_candidates.iter().all(|c| c.text.trim().is_empty())
        {
            return Err(ContextError::Configuration(
                "identity provider returned no core content".to_string(),
            ));
        }

        let timeout = Duration::from_millis(self.config.retrieval.source_timeout_ms);
        let retrieval = &self.config.retrieval;

        let memory_fut = async {
            match &self.memory {
                Some(source) => {
                    fetch_or_empty(
                        "semantic_memory",
                        timeout,
                        source.recall(&request.message, retrieval.memory_limit),
                    )
                    .await
                }
                None => Vec::new(),
            }
        };

        let facts_fut = async {
            match &self.facts {
                Some(source) => {
                    fetch_or_empty(
                        "facts",
                        timeout,
                        source.lookup(&request.message, retrieval.fact_limit),
                    )
                    .await
                }
                None => Vec::new(),
            }
        };

        let emotion_fut = async {
            match &self.emotion {
                Some(annotator) => {
                    match tokio::time::timeout(timeout, annotator.annotate(&request.message))
                        .await
                    {
                        Ok(Ok(annotation)) => Some(annotation),
                        Ok(Err(e)) => {
                            warn!(error = %e, "emotion annotator failed; skipping guidance");
                            METRICS.record_degraded_source("emotion", "error");
                            None
                        }
                        Err(_) => {
                            warn!(?timeout, "emotion annotator timed out; skipping guidance");
                            METRICS.record_degraded_source("emotion", "timeout");
                            None
                        }
                    }
                }
                None => None,
            }
        };

        let relationship_fut = async {
            match &self.relationship {
                Some(annotator) => {
                    match tokio::time::timeout(timeout, annotator.assess(&request.user_id)).await
                    {
                        Ok(Ok(state)) => Some(state),
                        Ok(Err(e)) => {
                            warn!(error = %e, "relationship annotator failed; skipping guidance");
                            METRICS.record_degraded_source("relationship", "error");
                            None
                        }
                        Err(_) => {
                            warn!(?timeout, "relationship annotator timed out; skipping guidance");
                            METRICS.record_degraded_source("relationship", "timeout");
                            None
                        }
                    }
                }
                None => None,
            }
        };

        let (memories, facts, emotion, relationship) =
            tokio::join!(memory_fut, facts_fut, emotion_fut, relationship_fut);

        debug!(
            memories = memories.len(),
            facts = facts.len(),
            emotion = emotion.is_some(),
            relationship = relationship.is_some(),
            "retrieval fan-out complete"
        );

        let mut candidates: Vec<CandidateContent> =
            self.ranker.merge(&request.history, memories, facts);

        if let Some(annotation) = emotion {
            candidates.push(emotion_candidate(
                &annotation,
                retrieval.emotion_priority,
                self.estimator.as_ref(),
            ));
        }
        if let Some(state) = relationship {
            candidates.push(relationship_candidate(
                &state,
                retrieval.relationship_priority,
                self.estimator.as_ref(),
            ));
        }
        candidates.extend(identity_candidates);

        let mut turns = request.history.clone();
        turns.push(ConversationTurn::new(
            TurnRole::User,
            request.message.clone(),
            request.user_id.clone(),
            self.estimator.as_ref(),
        ));

        self.assembler.build_prompt(&candidates, &turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterProfile, StaticIdentityProvider};
    use async_trait::async_trait;
    use crate::retrieval::sources::{RetrievalError, ScoredSnippet};

    fn pipeline() -> ContextPipeline {
        let profile = CharacterProfile::new("Elena", "A marine biologist.");
        let identity = Arc::new(StaticIdentityProvider::new(profile).unwrap());
        ContextPipeline::new(Config::default(), identity).unwrap()
    }

    #[tokio::test]
    async fn test_process_without_optional_sources() {
        let request = MessageRequest {
            user_id: "user-1".to_string(),
            message: "Tell me about whales.".to_string(),
            history: vec![],
        };

        let prompt = pipeline().process(&request).await.unwrap();
        // System message plus the current user turn
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, TurnRole::System);
        assert!(prompt.messages[0].content.contains("Elena"));
        assert_eq!(prompt.messages[1].content, "Tell me about whales.");
    }

    struct SlowMemory;

    #[async_trait]
    impl SemanticMemorySource for SlowMemory {
        async fn recall(
            &self,
            _query: &str,
            _limit: usize,
        ) -> std::result::Result<Vec<ScoredSnippet>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![ScoredSnippet::new("too slow to matter", 1.0)])
        }
    }

    #[tokio::test]
    async fn test_slow_source_degrades_not_blocks() {
        let mut config = Config::default();
        config.retrieval.source_timeout_ms = 20;

        let profile = CharacterProfile::new("Elena", "A marine biologist.");
        let identity = Arc::new(StaticIdentityProvider::new(profile).unwrap());
        let pipeline = ContextPipeline::new(config, identity)
            .unwrap()
            .with_memory_source(Arc::new(SlowMemory));

        let request = MessageRequest {
            user_id: "user-1".to_string(),
            message: "hello".to_string(),
            history: vec![],
        };

        let prompt = pipeline.process(&request).await.unwrap();
        assert!(!prompt.messages[0].content.contains("too slow to matter"));
    }
}
