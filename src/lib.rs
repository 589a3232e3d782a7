//! WhisperEngine context core
//!
//! Adaptive conversation-context budgeting and memory-retrieval
//! orchestration: for every inbound message, decide which prior turns,
//! retrieved memories and character facts fit into a bounded prompt under a
//! hard token ceiling, while keeping conversational continuity and never
//! dropping character identity.

pub mod annotators;
pub mod character;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;

pub use config::Config;
pub use error::{ContextError, Result};
pub use pipeline::{ContextPipeline, MessageRequest};

/// Initialize tracing from logging configuration. Call once at startup.
pub fn init_telemetry(config: &config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Commonly used types
pub mod prelude {
    pub use crate::annotators::{
        AffectAnnotation, EmotionAnnotator, RelationshipAnnotator, RelationshipState,
    };
    pub use crate::character::{CharacterProfile, IdentityProvider, StaticIdentityProvider};
    pub use crate::config::{BudgetConfig, Config, RetrievalConfig};
    pub use crate::context::{
        AssemblyStage, Budget, CandidateCategory, CandidateContent, CharsPerTokenEstimator,
        ContextWindowBudgeter, ConversationAssembler, ConversationTurn, FinalPrompt,
        PromptMessage, SystemPromptAssembler, TokenEstimator, TruncationResult, TurnRole,
    };
    pub use crate::error::{ContextError, Result};
    pub use crate::pipeline::{ContextPipeline, MessageRequest};
    pub use crate::retrieval::{
        FactSource, RetrievalError, RetrievalRanker, ScoredSnippet, SemanticMemorySource,
    };
}
