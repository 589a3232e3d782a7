//! System prompt assembly under a sub-budget
//!
//! Fills the system portion of the prompt with priority-then-relevance
//! greedy selection. Core identity is a hard invariant: it is always
//! included, even when it alone exceeds the sub-budget. Everything else is
//! included item by item while it fits; an oversized item is skipped whole,
//! never cut mid-text, and the scan keeps going to preserve density.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::models::{CandidateCategory, CandidateContent};
use super::token_estimator::TokenEstimator;

/// Assembled system content plus accounting
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    pub text: String,
    /// Estimate of the full assembled text, headers included
    pub tokens_used: usize,
    /// Categories with at least one item dropped for budget reasons
    pub dropped_categories: BTreeSet<CandidateCategory>,
}

/// Priority-then-relevance greedy system prompt assembler
pub struct SystemPromptAssembler {
    estimator: Arc<dyn TokenEstimator>,
}

impl SystemPromptAssembler {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    /// Assemble candidates into system text within `system_budget`.
    ///
    /// Budget checks run against the estimate of the actual text being
    /// built (section headers included), so `tokens_used` is what the
    /// downstream accounting sees, not just the sum of item estimates.
    pub fn assemble(
        &self,
        candidates: &[CandidateContent],
        system_budget: usize,
    ) -> SystemPrompt {
        let mut sorted: Vec<&CandidateContent> = candidates.iter().collect();
        sorted.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
                .then_with(|| a.category.cmp(&b.category))
        });

        let mut text = String::new();
        let mut open_section: Option<CandidateCategory> = None;
        let mut dropped: BTreeSet<CandidateCategory> = BTreeSet::new();

        // Core identity first, unconditionally. Dropping it would change the
        // system's fundamental contract: the character loses its identity.
        for item in sorted.iter().filter(|c| c.category.is_core()) {
            append_item(&mut text, &mut open_section, item);
        }

        let core_tokens = self.estimator.estimate(&text);
        if !text.is_empty() && core_tokens >= system_budget {
            for item in sorted.iter().filter(|c| !c.category.is_core()) {
                dropped.insert(item.category);
            }
            if !dropped.is_empty() {
                warn!(
                    core_tokens,
                    system_budget,
                    ?dropped,
                    "core identity consumed the entire system budget; all other categories dropped"
                );
            }
            return SystemPrompt {
                text,
                tokens_used: core_tokens,
                dropped_categories: dropped,
            };
        }

        for item in sorted.iter().filter(|c| !c.category.is_core()) {
            let mut attempt = text.clone();
            let mut attempt_section = open_section;
            append_item(&mut attempt, &mut attempt_section, item);

            if self.estimator.estimate(&attempt) <= system_budget {
                text = attempt;
                open_section = attempt_section;
            } else {
                // Skipped whole: a partial fact or memory is worse than none
                dropped.insert(item.category);
            }
        }

        let tokens_used = self.estimator.estimate(&text);
        debug!(
            tokens_used,
            system_budget,
            candidates = candidates.len(),
            dropped = dropped.len(),
            "system prompt assembled"
        );

        SystemPrompt {
            text,
            tokens_used,
            dropped_categories: dropped,
        }
    }
}

/// Append an item under its category header, opening a new section when the
/// category changes from the previously appended item.
fn append_item(
    text: &mut String,
    open_section: &mut Option<CandidateCategory>,
    item: &CandidateContent,
) {
    if *open_section != Some(item.category) {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push('[');
        text.push_str(item.category.header());
        text.push_str("]\n");
        *open_section = Some(item.category);
    } else {
        text.push('\n');
    }
    text.push_str(&item.text);
}
