//! Configuration for the context pipeline
//!
//! All values are read once at construction time and never change
//! mid-request. Per-character or per-conversation overrides are expressed by
//! constructing a different `Config`, not by mutating a shared one.

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Token budget settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Retrieval fan-out settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard ceiling for the full prompt (system content + conversation turns)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Most recent turns that are always kept, even over budget
    #[serde(default = "default_min_recent_messages")]
    pub min_recent_messages: usize,

    /// Fraction of `max_tokens` reserved for system content
    #[serde(default = "default_system_budget_fraction")]
    pub system_budget_fraction: f32,

    /// Allow mid-string truncation of system content as a last resort
    #[serde(default = "default_enable_emergency_truncation")]
    pub enable_emergency_truncation: bool,

    /// Characters-per-token divisor for the heuristic estimator
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

fn default_max_tokens() -> usize {
    8000
}

fn default_min_recent_messages() -> usize {
    2
}

fn default_system_budget_fraction() -> f32 {
    0.75
}

fn default_enable_emergency_truncation() -> bool {
    true
}

fn default_chars_per_token() -> usize {
    4
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_recent_messages: default_min_recent_messages(),
            system_budget_fraction: default_system_budget_fraction(),
            enable_emergency_truncation: default_enable_emergency_truncation(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl BudgetConfig {
    /// Validate that the split leaves room for conversation turns
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(ContextError::Configuration(
                "max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.system_budget_fraction) {
            return Err(ContextError::Configuration(format!(
                "system_budget_fraction must be in [0, 1): got {}",
                self.system_budget_fraction
            )));
        }
        if self.chars_per_token == 0 {
            return Err(ContextError::Configuration(
                "chars_per_token must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retrieval fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum semantic memories requested per message
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Maximum extracted facts requested per message
    #[serde(default = "default_fact_limit")]
    pub fact_limit: usize,

    /// Independent timeout applied to each retrieval source
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Priority tier for emotional guidance candidates
    #[serde(default = "default_emotion_priority")]
    pub emotion_priority: u8,

    /// Priority tier for relationship guidance candidates
    #[serde(default = "default_relationship_priority")]
    pub relationship_priority: u8,
}

fn default_memory_limit() -> usize {
    10
}

fn default_fact_limit() -> usize {
    10
}

fn default_source_timeout_ms() -> u64 {
    2000
}

fn default_emotion_priority() -> u8 {
    1
}

fn default_relationship_priority() -> u8 {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            memory_limit: default_memory_limit(),
            fact_limit: default_fact_limit(),
            source_timeout_ms: default_source_timeout_ms(),
            emotion_priority: default_emotion_priority(),
            relationship_priority: default_relationship_priority(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "whisper_context=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load from a layered configuration: optional `config.toml` file,
    /// then environment variables with the `WHISPER_` prefix
    /// (e.g. `WHISPER_BUDGET__MAX_TOKENS=8000`).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("WHISPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ContextError::Configuration(e.to_string()))?;

        let cfg: Config = settings
            .try_deserialize()
            .map_err(|e| ContextError::Configuration(e.to_string()))?;

        cfg.budget.validate()?;
        Ok(cfg)
    }

    /// Load defaults overridden by flat environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("WHISPER_MAX_TOKENS") {
            if let Ok(num) = val.parse() {
                cfg.budget.max_tokens = num;
            }
        }

        if let Ok(val) = std::env::var("WHISPER_MIN_RECENT_MESSAGES") {
            if let Ok(num) = val.parse() {
                cfg.budget.min_recent_messages = num;
            }
        }

        if let Ok(val) = std::env::var("WHISPER_SYSTEM_BUDGET_FRACTION") {
            if let Ok(num) = val.parse() {
                cfg.budget.system_budget_fraction = num;
            }
        }

        if let Ok(val) = std::env::var("WHISPER_ENABLE_EMERGENCY_TRUNCATION") {
            cfg.budget.enable_emergency_truncation = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("WHISPER_SOURCE_TIMEOUT_MS") {
            if let Ok(num) = val.parse() {
                cfg.retrieval.source_timeout_ms = num;
            }
        }

        if let Ok(val) = std::env::var("WHISPER_LOG_LEVEL") {
            cfg.logging.level = val;
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_config() {
        let config = BudgetConfig::default();
        assert_eq!(config.max_tokens, 8000);
        assert_eq!(config.min_recent_messages, 2);
        assert!((config.system_budget_fraction - 0.75).abs() < f32::EPSILON);
        assert!(config.enable_emergency_truncation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let config = BudgetConfig {
            system_budget_fraction: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = BudgetConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retrieval_config_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.memory_limit, 10);
        assert_eq!(config.source_timeout_ms, 2000);
        assert!(config.emotion_priority < config.relationship_priority);
    }
}
