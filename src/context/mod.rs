//! Adaptive context assembly under a hard token ceiling
//!
//! Decides, for every inbound message, which system content and conversation
//! turns make it into the bounded prompt:
//! - Cheap monotonic token estimation
//! - Newest-first conversation window budgeting with a continuity floor
//! - Priority-then-relevance system prompt assembly
//! - Emergency mid-string truncation as a last resort
//!
//! Everything in this module is pure, synchronous and request-scoped; it can
//! run concurrently across conversations with no coordination.

pub mod assembler;
pub mod models;
pub mod system_prompt;
pub mod token_estimator;
pub mod window;

pub use assembler::ConversationAssembler;
pub use models::{
    AssemblyStage, Budget, CandidateCategory, CandidateContent, ConversationTurn, FinalPrompt,
    PromptMessage, PromptMetadata, TruncationResult, TurnRole,
};
pub use system_prompt::{SystemPrompt, SystemPromptAssembler};
pub use token_estimator::{
    truncate_to_fit, CharsPerTokenEstimator, TokenEstimator, WordBasedEstimator,
};
pub use window::ContextWindowBudgeter;
