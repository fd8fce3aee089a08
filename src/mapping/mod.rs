//! Selector mapping
//!
//! Turns an old element and the ranked candidates of the new DOM into a
//! [`SelectorMatch`]. Two interchangeable strategies implement
//! [`SelectorMappingStrategy`]:
//! - [`RuleBasedStrategy`]: deterministic, picks the top candidate
//! - [`LlmStrategy`]: asks a chat model, falling back to the rule-based strategy on any failure
//!
//! [`SelectorAgent`] selects a strategy at construction time and maps whole
//! locator tables with [`SelectorAgent::map_all`].

pub mod agent;
pub mod llm;
pub mod openai;
pub mod report;
pub mod rule_based;

pub use agent::SelectorAgent;
pub use llm::LlmStrategy;
pub use openai::{ChatBackend, OpenAiChat};
pub use report::{MappingReport, MappingSummary};
pub use rule_based::RuleBasedStrategy;

use crate::dom::{Candidate, ElementContext};
use serde::{Deserialize, Serialize};

/// Confidence above which a mapping counts as successful in logs and reports
pub const CONFIDENT_MATCH: f64 = 0.7;

/// Proposed replacement for one named selector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorMatch {
    /// Selector declared in the old page object
    pub original_selector: String,

    /// Replacement selector, empty when no mapping is available
    pub new_selector: String,

    /// Trust in the replacement, in `[0, 1]`
    pub confidence: f64,

    /// Why this selector was chosen
    pub reasoning: String,
}

impl SelectorMatch {
    pub fn new(
        original_selector: impl Into<String>,
        new_selector: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            original_selector: original_selector.into(),
            new_selector: new_selector.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        }
    }

    /// "No mapping available": zero confidence and an empty selector
    pub fn unmapped(original_selector: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self::new(original_selector, "", 0.0, reasoning)
    }

    /// Whether this match may be written into the page object
    pub fn is_applicable(&self, confidence_threshold: f64) -> bool {
        self.confidence >= confidence_threshold && !self.new_selector.is_empty()
    }
}

/// The one selector a failed validation run was traced back to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureContext {
    /// Declared name of the failing selector
    pub selector_name: String,

    /// Failure description handed to the mapping strategy as a hint
    pub error_message: String,
}

/// Capability shared by all mapping strategies
pub trait SelectorMappingStrategy {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Produce a match for `old` from the ranked `candidates` (most similar first)
    fn propose(&self, old: &ElementContext, candidates: &[Candidate<'_>], failure_hint: Option<&str>)
    -> SelectorMatch;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let m = SelectorMatch::new("#a", "#b", 0.5, "");
        assert!(m.is_applicable(0.5));
        assert!(!m.is_applicable(0.51));
    }

    #[test]
    fn test_empty_selector_never_applies() {
        let m = SelectorMatch::new("#a", "", 1.0, "");
        assert!(!m.is_applicable(0.0));
    }

    #[test]
    fn test_unmapped() {
        let m = SelectorMatch::unmapped("#a", "Original element not found.");
        assert_eq!(m.confidence, 0.0);
        assert!(m.new_selector.is_empty());
        assert_eq!(m.reasoning, "Original element not found.");
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(SelectorMatch::new("#a", "#b", 1.7, "").confidence, 1.0);
        assert_eq!(SelectorMatch::new("#a", "#b", -0.2, "").confidence, 0.0);
    }
}
