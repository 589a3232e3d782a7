//! Crate-level error types

use thiserror::Error;

/// Errors surfaced to callers of the context pipeline
///
/// Only configuration problems are fatal. Retrieval failures are absorbed at
/// the pipeline boundary (see `retrieval::sources`) and never reach here.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Fatal misconfiguration: the pipeline refuses to produce a prompt
    /// rather than emit one without identity or without room for any turns.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The system content exceeded the total budget and emergency truncation
    /// is disabled by configuration.
    #[error("budget exceeded: system content is {system_tokens} tokens against a total budget of {total_budget}, and emergency truncation is disabled")]
    BudgetExceeded {
        system_tokens: usize,
        total_budget: usize,
    },

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;
