//! Top-level prompt assembly orchestration
//!
//! Combines the assembled system content with the budgeted conversation
//! window into the final bounded message list. Per-request state machine:
//! NORMAL -> ADAPTIVE_TRUNCATION -> EMERGENCY_TRUNCATION, each stage strictly
//! narrowing what is included. Emergency truncation is the only path that
//! cuts content mid-string, and it fires only when the system content alone
//! is larger than the entire allowed context.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::models::{
    AssemblyStage, Budget, CandidateContent, ConversationTurn, FinalPrompt, PromptMessage,
    PromptMetadata, TurnRole,
};
use super::system_prompt::SystemPromptAssembler;
use super::token_estimator::{truncate_to_fit, CharsPerTokenEstimator, TokenEstimator};
use super::window::ContextWindowBudgeter;
use crate::config::BudgetConfig;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;

/// Orchestrates system prompt assembly and conversation window budgeting
pub struct ConversationAssembler {
    budget: Budget,
    min_turns: usize,
    enable_emergency_truncation: bool,
    estimator: Arc<dyn TokenEstimator>,
    system_assembler: SystemPromptAssembler,
    window: ContextWindowBudgeter,
}

impl ConversationAssembler {
    pub fn new(
        budget: Budget,
        min_turns: usize,
        enable_emergency_truncation: bool,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        let system_assembler = SystemPromptAssembler::new(Arc::clone(&estimator));
        Self {
            budget,
            min_turns,
            enable_emergency_truncation,
            estimator,
            system_assembler,
            window: ContextWindowBudgeter::new(),
        }
    }

    /// Build from budget configuration, with the default char-ratio estimator
    pub fn from_config(config: &BudgetConfig) -> Result<Self> {
        config.validate()?;
        let budget = Budget::from_fraction(config.max_tokens, config.system_budget_fraction)?;
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(CharsPerTokenEstimator::new(config.chars_per_token));
        Ok(Self::new(
            budget,
            config.min_recent_messages,
            config.enable_emergency_truncation,
            estimator,
        ))
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Assemble the final bounded prompt.
    ///
    /// Pure and synchronous: no I/O, no suspension, deterministic for a
    /// given input. Fails only on misconfiguration (the emergency path being
    /// needed while disabled); truncation itself is never an error.
    pub fn build_prompt(
        &self,
        candidates: &[CandidateContent],
        turns: &[ConversationTurn],
    ) -> Result<FinalPrompt> {
        let system = self
            .system_assembler
            .assemble(candidates, self.budget.system_budget);

        let turn_tokens_before: usize = turns.iter().map(|t| t.estimated_tokens).sum();
        let tokens_before = system.tokens_used + turn_tokens_before;

        let mut system_text = system.text;
        let mut system_tokens = system.tokens_used;
        let mut min_turns = self.min_turns;
        let mut emergency_triggered = false;

        // Pathological: identity content larger than the whole context.
        // Whole-unit dropping cannot help; cut mid-string or refuse.
        if system_tokens > self.budget.total_budget {
            if !self.enable_emergency_truncation {
                return Err(ContextError::BudgetExceeded {
                    system_tokens,
                    total_budget: self.budget.total_budget,
                });
            }

            error!(
                system_tokens,
                total_budget = self.budget.total_budget,
                "emergency truncation: system content exceeds the entire context budget; \
                 upstream character content needs attention"
            );

            system_text =
                truncate_to_fit(self.estimator.as_ref(), &system_text, self.budget.total_budget);
            system_tokens = self.estimator.estimate(&system_text);
            min_turns = 0;
            emergency_triggered = true;
            METRICS.record_emergency_truncation();
        }

        let remaining_budget = self.budget.total_budget.saturating_sub(system_tokens);
        let truncation = self.window.select(turns, remaining_budget, min_turns);

        if truncation.exceeds(remaining_budget) {
            // Forced-minimum floor overran the budget; tolerated by policy
            warn!(
                tokens_after = truncation.tokens_after,
                remaining_budget,
                min_turns,
                "conversation floor exceeds remaining budget; keeping minimum continuity"
            );
        }

        let tokens_used = system_tokens + truncation.tokens_after;
        let tokens_removed = tokens_before.saturating_sub(tokens_used);

        let stage = if emergency_triggered {
            AssemblyStage::EmergencyTruncation
        } else if truncation.dropped_count > 0 || !system.dropped_categories.is_empty() {
            AssemblyStage::AdaptiveTruncation
        } else {
            AssemblyStage::Normal
        };

        let mut messages = Vec::with_capacity(truncation.included_turns.len() + 1);
        if !system_text.is_empty() {
            messages.push(PromptMessage {
                role: TurnRole::System,
                content: system_text,
            });
        }
        messages.extend(truncation.included_turns.iter().map(|t| PromptMessage {
            role: t.role,
            content: t.text.clone(),
        }));

        info!(
            tokens_before,
            tokens_after = tokens_used,
            dropped_count = truncation.dropped_count,
            dropped_categories = ?system.dropped_categories,
            emergency_triggered,
            %stage,
            "prompt assembled"
        );
        METRICS.record_assembly(
            tokens_before,
            tokens_used,
            truncation.dropped_count,
            system.dropped_categories.len(),
        );

        Ok(FinalPrompt {
            messages,
            metadata: PromptMetadata {
                tokens_before,
                tokens_used,
                tokens_removed,
                dropped_turns: truncation.dropped_count,
                dropped_categories: system.dropped_categories,
                emergency_triggered,
                stage,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::CandidateCategory;
    use chrono::{Duration, Utc};

    fn estimator() -> Arc<dyn TokenEstimator> {
        Arc::new(CharsPerTokenEstimator::default())
    }

    fn assembler_with(total: usize, fraction: f32, min_turns: usize) -> ConversationAssembler {
        let budget = Budget::from_fraction(total, fraction).unwrap();
        ConversationAssembler::new(budget, min_turns, true, estimator())
    }

    fn identity_candidate(tokens: usize) -> CandidateContent {
        let est = CharsPerTokenEstimator::default();
        CandidateContent::new(
            CandidateCategory::CoreIdentity,
            "I".repeat(tokens * 4),
            1.0,
            &est,
        )
    }

    fn turns_of(tokens: usize, count: usize) -> Vec<ConversationTurn> {
        let est = CharsPerTokenEstimator::default();
        let base = Utc::now();
        (0..count)
            .map(|i| {
                let role = if i % 2 == 0 {
                    TurnRole::User
                } else {
                    TurnRole::Assistant
                };
                ConversationTurn::new(role, "t".repeat(tokens * 4), "user-1", &est)
                    .with_timestamp(base + Duration::seconds(i as i64))
            })
            .collect()
    }

    #[test]
    fn test_under_budget_everything_included() {
        let assembler = assembler_with(8000, 0.75, 2);
        let candidates = vec![identity_candidate(2000)];
        let turns = turns_of(50, 15);

        let prompt = assembler.build_prompt(&candidates, &turns).unwrap();
        assert_eq!(prompt.messages.len(), 16); // system + 15 turns
        assert_eq!(prompt.metadata.dropped_turns, 0);
        assert!(!prompt.metadata.emergency_triggered);
        assert_eq!(prompt.metadata.stage, AssemblyStage::Normal);
        assert!(prompt.metadata.tokens_used <= 8000);
    }

    #[test]
    fn test_over_budget_drops_oldest_turns() {
        let assembler = assembler_with(8000, 0.25, 2);
        let candidates = vec![identity_candidate(1000)];
        let turns = turns_of(768, 15);

        let prompt = assembler.build_prompt(&candidates, &turns).unwrap();
        assert!(prompt.metadata.dropped_turns > 0);
        assert_eq!(prompt.metadata.stage, AssemblyStage::AdaptiveTruncation);
        assert!(prompt.metadata.tokens_used <= 8000);

        // Turn messages remain in chronological order
        let turn_messages = &prompt.messages[1..];
        assert!(!turn_messages.is_empty());
        assert!(turn_messages.iter().all(|m| m.role != TurnRole::System));
    }

    #[test]
    fn test_emergency_truncation_when_identity_overflows() {
        let assembler = assembler_with(8000, 0.9, 2);
        // 9000-token identity against an 8000-token total budget
        let candidates = vec![identity_candidate(9000)];
        let turns = turns_of(50, 4);

        let prompt = assembler.build_prompt(&candidates, &turns).unwrap();
        assert!(prompt.metadata.emergency_triggered);
        assert_eq!(prompt.metadata.stage, AssemblyStage::EmergencyTruncation);
        assert!(prompt.metadata.tokens_used <= 8000);

        // min_turns floor is waived on the emergency path
        let system = &prompt.messages[0];
        assert_eq!(system.role, TurnRole::System);
        assert!(CharsPerTokenEstimator::default().estimate(&system.content) <= 8000);
    }

    #[test]
    fn test_emergency_disabled_is_fatal() {
        let budget = Budget::from_fraction(8000, 0.75).unwrap();
        let assembler = ConversationAssembler::new(budget, 2, false, estimator());
        let candidates = vec![identity_candidate(9000)];

        let err = assembler.build_prompt(&candidates, &[]).unwrap_err();
        assert!(matches!(err, ContextError::BudgetExceeded { .. }));
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        let assembler = assembler_with(8000, 0.75, 2);
        let prompt = assembler.build_prompt(&[], &[]).unwrap();
        assert!(prompt.messages.is_empty());
        assert_eq!(prompt.metadata.tokens_used, 0);
        assert_eq!(prompt.metadata.dropped_turns, 0);
        assert!(!prompt.metadata.emergency_triggered);
        assert_eq!(prompt.metadata.stage, AssemblyStage::Normal);
    }

    #[test]
    fn test_from_config_defaults() {
        let config = BudgetConfig::default();
        let assembler = ConversationAssembler::from_config(&config).unwrap();
        assert_eq!(assembler.budget().total_budget, 8000);
        assert_eq!(assembler.budget().system_budget, 6000);
    }

    #[test]
    fn test_minimum_floor_overage_is_tolerated() {
        let assembler = assembler_with(1000, 0.5, 2);
        let candidates = vec![identity_candidate(100)];
        // Two recent turns alone exceed the remaining budget
        let turns = turns_of(600, 3);

        let prompt = assembler.build_prompt(&candidates, &turns).unwrap();
        // At least the two most recent turns survive
        assert!(prompt.messages.len() >= 3);
        assert!(prompt.metadata.tokens_used > 1000);
        assert!(!prompt.metadata.emergency_triggered);
    }

    #[test]
    fn test_tokens_removed_accounting() {
        let assembler = assembler_with(8000, 0.25, 2);
        let candidates = vec![identity_candidate(500)];
        let turns = turns_of(768, 15);

        let prompt = assembler.build_prompt(&candidates, &turns).unwrap();
        assert_eq!(
            prompt.metadata.tokens_removed,
            prompt.metadata.tokens_before - prompt.metadata.tokens_used
        );
        assert!(prompt.metadata.tokens_removed > 0);
    }
}
