//! Character identity provider
//!
//! Consumes a pre-built character profile (CDL loading is out of scope) and
//! turns it into core identity candidates. An empty identity is a fatal
//! configuration error: the pipeline never sends an identity-less prompt.

use serde::{Deserialize, Serialize};

use crate::context::models::{CandidateCategory, CandidateContent};
use crate::context::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};

/// Static character definition, already parsed by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub speaking_style: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            personality_traits: Vec::new(),
            speaking_style: None,
            backstory: None,
        }
    }

    pub fn with_traits(mut self, traits: Vec<String>) -> Self {
        self.personality_traits = traits;
        self
    }

    pub fn with_speaking_style(mut self, style: impl Into<String>) -> Self {
        self.speaking_style = Some(style.into());
        self
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = Some(backstory.into());
        self
    }
}

/// Produces the core identity candidates for every request
pub trait IdentityProvider: Send + Sync {
    /// Must return at least one non-empty CoreIdentity candidate
    fn identity_candidates(&self, estimator: &dyn TokenEstimator) -> Vec<CandidateContent>;
}

/// Identity provider backed by a static, validated profile
pub struct StaticIdentityProvider {
    profile: CharacterProfile,
}

impl StaticIdentityProvider {
    /// Validates the profile up front; an identity that cannot fill a prompt
    /// is rejected here rather than discovered mid-conversation.
    pub fn new(profile: CharacterProfile) -> Result<Self> {
        if profile.name.trim().is_empty() {
            return Err(ContextError::Configuration(
                "character profile has an empty name".to_string(),
            ));
        }
        if profile.description.trim().is_empty() {
            return Err(ContextError::Configuration(
                "character profile has an empty description".to_string(),
            ));
        }
        Ok(Self { profile })
    }

    pub fn profile(&self) -> &CharacterProfile {
        &self.profile
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn identity_candidates(&self, estimator: &dyn TokenEstimator) -> Vec<CandidateContent> {
        let p = &self.profile;
        let mut block = format!("You are {}. {}", p.name, p.description);

        if !p.personality_traits.is_empty() {
            block.push_str("\nPersonality: ");
            block.push_str(&p.personality_traits.join(", "));
            block.push('.');
        }
        if let Some(style) = &p.speaking_style {
            block.push_str("\nSpeaking style: ");
            block.push_str(style);
        }

        let mut candidates = vec![CandidateContent::new(
            CandidateCategory::CoreIdentity,
            block,
            1.0,
            estimator,
        )];

        if let Some(backstory) = &p.backstory {
            candidates.push(CandidateContent::new(
                CandidateCategory::CoreIdentity,
                format!("Background: {backstory}"),
                0.9,
                estimator,
            ));
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::CharsPerTokenEstimator;

    fn elena() -> CharacterProfile {
        CharacterProfile::new(
            "Elena Rodriguez",
            "A marine biologist who loves sharing ocean discoveries.",
        )
        .with_traits(vec!["curious".to_string(), "warm".to_string()])
        .with_speaking_style("enthusiastic, uses ocean metaphors")
    }

    #[test]
    fn test_empty_name_rejected() {
        let profile = CharacterProfile::new("  ", "description");
        assert!(StaticIdentityProvider::new(profile).is_err());
    }

    #[test]
    fn test_empty_description_rejected() {
        let profile = CharacterProfile::new("Elena", "");
        assert!(StaticIdentityProvider::new(profile).is_err());
    }

    #[test]
    fn test_identity_candidates_are_core() {
        let estimator = CharsPerTokenEstimator::default();
        let provider = StaticIdentityProvider::new(elena()).unwrap();
        let candidates = provider.identity_candidates(&estimator);

        assert!(!candidates.is_empty());
        for candidate in &candidates {
            assert_eq!(candidate.category, CandidateCategory::CoreIdentity);
            assert_eq!(candidate.priority, 0);
            assert!(!candidate.text.is_empty());
        }
        assert!(candidates[0].text.contains("Elena Rodriguez"));
        assert!(candidates[0].text.contains("ocean metaphors"));
    }

    #[test]
    fn test_backstory_becomes_second_candidate() {
        let estimator = CharsPerTokenEstimator::default();
        let provider =
            StaticIdentityProvider::new(elena().with_backstory("Grew up on the Azores."))
                .unwrap();
        let candidates = provider.identity_candidates(&estimator);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[1].text.contains("Azores"));
    }
}
