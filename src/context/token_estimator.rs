//! Token estimation heuristics
//!
//! Budgeting never calls the provider's real tokenizer. A cheap, pure,
//! monotonic approximation is enough: every downstream comparison uses the
//! same estimator, so relative decisions stay valid. Callers needing strict
//! compliance with a real tokenizer apply a safety margin to the total budget
//! instead.

/// Token estimator trait for different estimation strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Character-ratio estimator (default, ~4 chars per token)
///
/// `ceil(chars / divisor)` over Unicode scalar values. Empty input is zero
/// tokens; appending text never decreases the estimate.
pub struct CharsPerTokenEstimator {
    chars_per_token: usize,
}

impl CharsPerTokenEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        debug_assert!(chars_per_token > 0);
        Self { chars_per_token }
    }
}

impl Default for CharsPerTokenEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharsPerTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(self.chars_per_token)
    }
}

/// Word-based token estimator (alternative, ~1.3 tokens per word)
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}

/// Longest prefix of `text` (on a char boundary) whose estimate fits within
/// `max_tokens`. Used only by emergency truncation; everything else drops
/// whole units instead of cutting mid-string.
pub fn truncate_to_fit(estimator: &dyn TokenEstimator, text: &str, max_tokens: usize) -> String {
    if estimator.estimate(text) <= max_tokens {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();

    // Binary search over prefix length; valid because estimates are
    // monotonic under append.
    let mut lo = 0usize;
    let mut hi = chars.len();
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let prefix: String = chars[..mid].iter().collect();
        if estimator.estimate(&prefix) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    chars[..lo].iter().collect()
}
