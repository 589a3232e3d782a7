//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Prompt assembly metrics
    pub prompt_tokens_before: Histogram,
    pub prompt_tokens_after: Histogram,
    pub turns_dropped: Histogram,
    pub categories_dropped: Histogram,
    pub assemblies: Counter,
    pub emergency_truncations: Counter,

    // Retrieval metrics
    pub degraded_sources: CounterVec,
    pub retrieval_candidates: Histogram,
    pub duplicate_candidates: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let prompt_tokens_before = register_histogram_with_registry!(
            "prompt_tokens_before",
            "Estimated tokens available before truncation",
            registry
        )?;

        let prompt_tokens_after = register_histogram_with_registry!(
            "prompt_tokens_after",
            "Estimated tokens in the assembled prompt",
            registry
        )?;

        let turns_dropped = register_histogram_with_registry!(
            "prompt_turns_dropped",
            "Conversation turns dropped per assembly",
            registry
        )?;

        let categories_dropped = register_histogram_with_registry!(
            "prompt_categories_dropped",
            "Candidate categories dropped per assembly",
            registry
        )?;

        let assemblies = register_counter_with_registry!(
            Opts::new("prompt_assemblies_total", "Total prompt assemblies"),
            registry
        )?;

        let emergency_truncations = register_counter_with_registry!(
            Opts::new(
                "prompt_emergency_truncations_total",
                "Total emergency mid-string truncations"
            ),
            registry
        )?;

        let degraded_sources = register_counter_vec_with_registry!(
            Opts::new(
                "retrieval_degraded_total",
                "Retrieval sources degraded to empty results"
            ),
            &["source", "reason"],
            registry
        )?;

        let retrieval_candidates = register_histogram_with_registry!(
            "retrieval_candidates",
            "Merged candidates produced per message",
            registry
        )?;

        let duplicate_candidates = register_counter_with_registry!(
            Opts::new(
                "retrieval_duplicates_total",
                "Duplicate candidates collapsed during merge"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            prompt_tokens_before,
            prompt_tokens_after,
            turns_dropped,
            categories_dropped,
            assemblies,
            emergency_truncations,
            degraded_sources,
            retrieval_candidates,
            duplicate_candidates,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one prompt assembly
    pub fn record_assembly(
        &self,
        tokens_before: usize,
        tokens_after: usize,
        dropped_turns: usize,
        dropped_categories: usize,
    ) {
        self.assemblies.inc();
        self.prompt_tokens_before.observe(tokens_before as f64);
        self.prompt_tokens_after.observe(tokens_after as f64);
        self.turns_dropped.observe(dropped_turns as f64);
        self.categories_dropped.observe(dropped_categories as f64);
    }

    /// Record an emergency truncation event
    pub fn record_emergency_truncation(&self) {
        self.emergency_truncations.inc();
    }

    /// Record a retrieval source degrading to empty results
    pub fn record_degraded_source(&self, source: &str, reason: &str) {
        self.degraded_sources
            .with_label_values(&[source, reason])
            .inc();
    }

    /// Record the merged candidate pool size
    pub fn record_merge(&self, candidates: usize, duplicates: usize) {
        self.retrieval_candidates.observe(candidates as f64);
        self.duplicate_candidates.inc_by(duplicates as f64);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_assembly() {
        let metrics = Metrics::new().unwrap();
        metrics.record_assembly(12000, 7900, 7, 2);
        metrics.record_assembly(750, 750, 0, 0);
        // Recording must never panic
    }

    #[test]
    fn test_record_degraded_source() {
        let metrics = Metrics::new().unwrap();
        metrics.record_degraded_source("semantic_memory", "timeout");
        metrics.record_degraded_source("facts", "backend");
        let exported = metrics.export_prometheus();
        assert!(exported.contains("retrieval_degraded_total"));
    }
}
