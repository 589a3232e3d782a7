//! Data models for context assembly

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One message exchange unit in a conversation
///
/// Immutable once created. Turns are totally ordered by timestamp; the role
/// sequence need not strictly alternate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Cached at construction so budgeting never re-walks the text
    pub estimated_tokens: usize,
    pub source_user_id: String,
}

impl ConversationTurn {
    pub fn new(
        role: TurnRole,
        text: impl Into<String>,
        source_user_id: impl Into<String>,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let text = text.into();
        let estimated_tokens = estimator.estimate(&text);
        Self {
            role,
            text,
            timestamp: Utc::now(),
            estimated_tokens,
            source_user_id: source_user_id.into(),
        }
    }

    /// Override the creation timestamp (replayed history, tests)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Category of content competing for a slot in the system prompt
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CandidateCategory {
    CoreIdentity,
    RetrievedMemory,
    ExtractedFact,
    EmotionalGuidance,
    RelationshipGuidance,
    ConversationSummary,
}

impl CandidateCategory {
    /// Default priority tier: lower is more essential. Core identity is 0
    /// and is never dropped regardless of budget pressure.
    pub fn default_priority(&self) -> u8 {
        match self {
            CandidateCategory::CoreIdentity => 0,
            CandidateCategory::EmotionalGuidance => 1,
            CandidateCategory::RelationshipGuidance => 2,
            CandidateCategory::ExtractedFact => 3,
            CandidateCategory::RetrievedMemory => 4,
            CandidateCategory::ConversationSummary => 5,
        }
    }

    /// Section header emitted above this category in the assembled prompt
    pub fn header(&self) -> &'static str {
        match self {
            CandidateCategory::CoreIdentity => "CHARACTER IDENTITY",
            CandidateCategory::RetrievedMemory => "RELEVANT MEMORIES",
            CandidateCategory::ExtractedFact => "KNOWN FACTS",
            CandidateCategory::EmotionalGuidance => "EMOTIONAL STATE",
            CandidateCategory::RelationshipGuidance => "RELATIONSHIP",
            CandidateCategory::ConversationSummary => "CONVERSATION SUMMARY",
        }
    }

    /// How specific the category is about its underlying content. Used when
    /// deduplication collapses the same text seen from multiple sources.
    pub fn specificity(&self) -> u8 {
        match self {
            CandidateCategory::CoreIdentity => 6,
            CandidateCategory::ExtractedFact => 5,
            CandidateCategory::EmotionalGuidance => 4,
            CandidateCategory::RelationshipGuidance => 3,
            CandidateCategory::RetrievedMemory => 2,
            CandidateCategory::ConversationSummary => 1,
        }
    }

    pub fn is_core(&self) -> bool {
        matches!(self, CandidateCategory::CoreIdentity)
    }

    /// Every category that can be dropped under budget pressure
    pub fn droppable() -> [CandidateCategory; 5] {
        [
            CandidateCategory::RetrievedMemory,
            CandidateCategory::ExtractedFact,
            CandidateCategory::EmotionalGuidance,
            CandidateCategory::RelationshipGuidance,
            CandidateCategory::ConversationSummary,
        ]
    }
}

/// A unit of material competing for inclusion in the system prompt
///
/// Constructed fresh per request, never mutated, discarded after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateContent {
    pub category: CandidateCategory,
    /// Lower is more essential; core identity is always 0
    pub priority: u8,
    pub text: String,
    pub estimated_tokens: usize,
    /// Ranks items within a category, never across categories
    pub relevance_score: f32,
}

impl CandidateContent {
    pub fn new(
        category: CandidateCategory,
        text: impl Into<String>,
        relevance_score: f32,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let text = text.into();
        let estimated_tokens = estimator.estimate(&text);
        Self {
            category,
            priority: category.default_priority(),
            text,
            estimated_tokens,
            relevance_score,
        }
    }

    /// Override the default priority tier for this candidate
    pub fn with_priority(mut self, priority: u8) -> Self {
        // Core identity stays pinned at 0
        if !self.category.is_core() {
            self.priority = priority;
        }
        self
    }
}

/// Token ceiling split into two cooperating sub-budgets
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Budget {
    /// Ceiling for the full prompt: system content plus conversation turns
    pub total_budget: usize,
    /// Sub-ceiling for assembled system content
    pub system_budget: usize,
}

impl Budget {
    /// Split a total budget by fraction: `system_budget = floor(total * fraction)`.
    /// `total - system` is the space guaranteed available for turns.
    pub fn from_fraction(total_budget: usize, system_budget_fraction: f32) -> Result<Self> {
        if total_budget == 0 {
            return Err(ContextError::Configuration(
                "total budget must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&system_budget_fraction) {
            return Err(ContextError::Configuration(format!(
                "system budget fraction must be in [0, 1): got {system_budget_fraction}"
            )));
        }

        let system_budget = (total_budget as f64 * system_budget_fraction as f64).floor() as usize;
        if system_budget >= total_budget {
            return Err(ContextError::Configuration(format!(
                "system budget {system_budget} leaves no room for conversation turns within total {total_budget}"
            )));
        }

        Ok(Self {
            total_budget,
            system_budget,
        })
    }

    /// Space guaranteed for conversation turns in the worst case
    pub fn guaranteed_turn_budget(&self) -> usize {
        self.total_budget - self.system_budget
    }
}

/// Output of the conversation-window budgeting step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationResult {
    /// Ordered subsequence of the input, chronological order preserved
    pub included_turns: Vec<ConversationTurn>,
    pub dropped_count: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl TruncationResult {
    /// True when the forced-minimum floor pushed us past the budget
    pub fn exceeds(&self, available_tokens: usize) -> bool {
        self.tokens_after > available_tokens
    }
}

/// Per-request assembly stage. Each stage strictly narrows included content;
/// no transition skips backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStage {
    Normal,
    AdaptiveTruncation,
    EmergencyTruncation,
}

impl std::fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssemblyStage::Normal => "normal",
            AssemblyStage::AdaptiveTruncation => "adaptive_truncation",
            AssemblyStage::EmergencyTruncation => "emergency_truncation",
        };
        f.write_str(s)
    }
}

/// One message in the final bounded prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: TurnRole,
    pub content: String,
}

/// Metadata accompanying an assembled prompt, consumed by monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub tokens_before: usize,
    pub tokens_used: usize,
    pub tokens_removed: usize,
    pub dropped_turns: usize,
    pub dropped_categories: BTreeSet<CandidateCategory>,
    pub emergency_triggered: bool,
    pub stage: AssemblyStage,
}

/// Final bounded message list sent downstream to the LLM layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalPrompt {
    /// System message first, then included turns in chronological order
    pub messages: Vec<PromptMessage>,
    pub metadata: PromptMetadata,
}
