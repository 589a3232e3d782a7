//! Emotion and relationship annotators
//!
//! Each annotator is a black-box classifier returning a small structured
//! record. The pipeline wraps records into guidance candidates with a
//! configured priority tier; a failed annotator simply contributes nothing
//! this turn.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::models::{CandidateCategory, CandidateContent};
use crate::context::token_estimator::TokenEstimator;
use crate::retrieval::sources::RetrievalError;

pub use http::{AnnotatorConfig, HttpEmotionAnnotator};

/// Emotion classification for a user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectAnnotation {
    pub label: String,
    /// 0.0-1.0
    pub intensity: f32,
    /// 0.0-1.0
    pub confidence: f32,
}

impl AffectAnnotation {
    pub fn new(label: impl Into<String>, intensity: f32, confidence: f32) -> Self {
        Self {
            label: label.into(),
            intensity: intensity.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Relationship standing between the character and a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipState {
    /// e.g. "acquaintance", "friend", "confidant"
    pub level: String,
    /// 0.0-1.0
    pub trust: f32,
    /// 0.0-1.0
    pub affection: f32,
}

/// Classifies the emotional tone of a message
#[async_trait]
pub trait EmotionAnnotator: Send + Sync {
    async fn annotate(&self, text: &str) -> Result<AffectAnnotation, RetrievalError>;
}

/// Assesses relationship standing for a user
#[async_trait]
pub trait RelationshipAnnotator: Send + Sync {
    async fn assess(&self, user_id: &str) -> Result<RelationshipState, RetrievalError>;
}

/// Render an emotion annotation into an EmotionalGuidance candidate.
/// Confidence doubles as the relevance score so weak classifications lose
/// ties against stronger material in the same tier.
pub fn emotion_candidate(
    annotation: &AffectAnnotation,
    priority: u8,
    estimator: &dyn TokenEstimator,
) -> CandidateContent {
    let text = format!(
        "The user currently sounds {} (intensity {:.2}). Acknowledge their state and respond with matching sensitivity.",
        annotation.label, annotation.intensity
    );
    CandidateContent::new(
        CandidateCategory::EmotionalGuidance,
        text,
        annotation.confidence,
        estimator,
    )
    .with_priority(priority)
}

/// Render relationship standing into a RelationshipGuidance candidate
pub fn relationship_candidate(
    state: &RelationshipState,
    priority: u8,
    estimator: &dyn TokenEstimator,
) -> CandidateContent {
    let text = format!(
        "Your relationship with this user: {} (trust {:.2}, affection {:.2}). Let familiarity shape your tone accordingly.",
        state.level, state.trust, state.affection
    );
    let relevance = (state.trust + state.affection) / 2.0;
    CandidateContent::new(
        CandidateCategory::RelationshipGuidance,
        text,
        relevance,
        estimator,
    )
    .with_priority(priority)
}
