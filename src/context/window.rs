//! Conversation window budgeting
//!
//! Selects the newest-first suffix of the conversation that fits the
//! available token budget, with a hard floor of `min_turns` most-recent turns
//! that are kept even over budget. Slight overage is preferred over losing
//! all continuity; the caller logs it as a near-limit condition, not an
//! error.

use tracing::debug;

use super::models::{ConversationTurn, TruncationResult};

/// Newest-first greedy turn selection with a forced-minimum floor
#[derive(Debug, Default)]
pub struct ContextWindowBudgeter;

impl ContextWindowBudgeter {
    pub fn new() -> Self {
        Self
    }

    /// Select the turns that fit within `available_tokens`.
    ///
    /// The most recent `min_turns` are always included, counted toward the
    /// running total. Older turns are added newest-first while they fit;
    /// the first rejection stops the scan, with no gap filling from
    /// even-older-but-smaller turns, so drops are always a prefix of the
    /// history. Never errors; the worst case is a small overage from the
    /// forced floor.
    pub fn select(
        &self,
        turns: &[ConversationTurn],
        available_tokens: usize,
        min_turns: usize,
    ) -> TruncationResult {
        let tokens_before: usize = turns.iter().map(|t| t.estimated_tokens).sum();

        if tokens_before <= available_tokens {
            return TruncationResult {
                included_turns: turns.to_vec(),
                dropped_count: 0,
                tokens_before,
                tokens_after: tokens_before,
            };
        }

        let mut included: Vec<ConversationTurn> = Vec::new();
        let mut running_total = 0usize;

        for (idx, turn) in turns.iter().rev().enumerate() {
            if idx < min_turns {
                // Continuity floor: keep regardless of the running total
                running_total += turn.estimated_tokens;
                included.push(turn.clone());
            } else if running_total + turn.estimated_tokens <= available_tokens {
                running_total += turn.estimated_tokens;
                included.push(turn.clone());
            } else {
                break;
            }
        }

        included.reverse();
        let dropped_count = turns.len() - included.len();

        debug!(
            tokens_before,
            tokens_after = running_total,
            dropped_count,
            available_tokens,
            "conversation window truncated"
        );

        TruncationResult {
            included_turns: included,
            dropped_count,
            tokens_before,
            tokens_after: running_total,
        }
    }
}
