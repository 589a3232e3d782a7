//! Merging multiple retrieval sources into one candidate pool
//!
//! Recency-ordered recent turns, semantic memories and fact-graph results
//! arrive independently scored. The ranker produces a single canonical
//! sorted, deduplicated candidate list so no call site has to reason about
//! scattered sort-order assumptions.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::sources::ScoredSnippet;
use crate::context::models::{CandidateCategory, CandidateContent, ConversationTurn};
use crate::context::token_estimator::TokenEstimator;
use crate::metrics::METRICS;

/// Merges scored retrieval results into a deduplicated candidate pool
pub struct RetrievalRanker {
    estimator: Arc<dyn TokenEstimator>,
}

impl RetrievalRanker {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    /// Merge retrieval results into candidates for system prompt assembly.
    ///
    /// Dedup key is a hash of the normalized text. On a duplicate, the
    /// higher relevance score wins and the category merges to the more
    /// specific of the pair. Snippets that replicate a recent turn are
    /// suppressed outright: the turn already carries that content into the
    /// prompt.
    pub fn merge(
        &self,
        recent_turns: &[ConversationTurn],
        semantic_memories: Vec<ScoredSnippet>,
        extracted_facts: Vec<ScoredSnippet>,
    ) -> Vec<CandidateContent> {
        let turn_hashes: Vec<String> = recent_turns
            .iter()
            .map(|t| normalized_hash(&t.text))
            .collect();

        let mut pool: HashMap<String, CandidateContent> = HashMap::new();
        let mut duplicates = 0usize;

        let memories = semantic_memories
            .into_iter()
            .map(|s| (CandidateCategory::RetrievedMemory, s));
        let facts = extracted_facts
            .into_iter()
            .map(|s| (CandidateCategory::ExtractedFact, s));

        for (category, snippet) in memories.chain(facts) {
            let key = normalized_hash(&snippet.text);

            if turn_hashes.contains(&key) {
                duplicates += 1;
                continue;
            }

            let candidate = CandidateContent::new(
                category,
                snippet.text,
                snippet.relevance,
                self.estimator.as_ref(),
            );

            match pool.get_mut(&key) {
                Some(existing) => {
                    duplicates += 1;
                    let merged_category = more_specific(existing.category, candidate.category);
                    if candidate.relevance_score > existing.relevance_score {
                        *existing = candidate;
                    }
                    existing.category = merged_category;
                    existing.priority = merged_category.default_priority();
                }
                None => {
                    pool.insert(key, candidate);
                }
            }
        }

        let mut candidates: Vec<CandidateContent> = pool.into_values().collect();
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
                .then_with(|| a.text.cmp(&b.text))
        });

        debug!(
            candidates = candidates.len(),
            duplicates, "retrieval results merged"
        );
        METRICS.record_merge(candidates.len(), duplicates);

        candidates
    }
}

/// SHA-256 over lowercased, whitespace-collapsed text
fn normalized_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn more_specific(a: CandidateCategory, b: CandidateCategory) -> CandidateCategory {
    if a.specificity() >= b.specificity() {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::TurnRole;
    use crate::context::token_estimator::CharsPerTokenEstimator;

    fn ranker() -> RetrievalRanker {
        RetrievalRanker::new(Arc::new(CharsPerTokenEstimator::default()))
    }

    #[test]
    fn test_merge_empty_sources() {
        let candidates = ranker().merge(&[], vec![], vec![]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_merge_assigns_categories() {
        let candidates = ranker().merge(
            &[],
            vec![ScoredSnippet::new("we talked about whales", 0.8)],
            vec![ScoredSnippet::new("user name is Mark", 0.9)],
        );

        assert_eq!(candidates.len(), 2);
        // Facts carry a lower priority tier than memories
        assert_eq!(candidates[0].category, CandidateCategory::ExtractedFact);
        assert_eq!(candidates[1].category, CandidateCategory::RetrievedMemory);
    }

    #[test]
    fn test_duplicate_keeps_higher_relevance_and_specific_category() {
        let candidates = ranker().merge(
            &[],
            vec![ScoredSnippet::new("User lives in   Lisbon", 0.9)],
            vec![ScoredSnippet::new("user lives in lisbon", 0.4)],
        );

        assert_eq!(candidates.len(), 1);
        let winner = &candidates[0];
        // Higher relevance wins the content slot
        assert!((winner.relevance_score - 0.9).abs() < f32::EPSILON);
        // Category merges to the more specific source
        assert_eq!(winner.category, CandidateCategory::ExtractedFact);
        assert_eq!(
            winner.priority,
            CandidateCategory::ExtractedFact.default_priority()
        );
    }

    #[test]
    fn test_normalization_collapses_whitespace_and_case() {
        assert_eq!(
            normalized_hash("Hello   World"),
            normalized_hash("hello world")
        );
        assert_ne!(normalized_hash("hello world"), normalized_hash("helloworld"));
    }

    #[test]
    fn test_snippets_matching_recent_turns_suppressed() {
        let estimator = CharsPerTokenEstimator::default();
        let turns = vec![ConversationTurn::new(
            TurnRole::User,
            "I just adopted a cat",
            "user-1",
            &estimator,
        )];

        let candidates = ranker().merge(
            &turns,
            vec![
                ScoredSnippet::new("i just adopted a cat", 0.95),
                ScoredSnippet::new("user has a dog named Rex", 0.5),
            ],
            vec![],
        );

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.contains("Rex"));
    }

    #[test]
    fn test_output_sorted_by_priority_then_relevance() {
        let candidates = ranker().merge(
            &[],
            vec![
                ScoredSnippet::new("memory low", 0.2),
                ScoredSnippet::new("memory high", 0.9),
            ],
            vec![ScoredSnippet::new("fact", 0.1)],
        );

        assert_eq!(candidates[0].text, "fact");
        assert_eq!(candidates[1].text, "memory high");
        assert_eq!(candidates[2].text, "memory low");
    }
}
