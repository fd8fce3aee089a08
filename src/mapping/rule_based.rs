use crate::{dom::{element::{element_id, tag_name, test_id},
                  Candidate, ElementContext},
            mapping::{SelectorMappingStrategy, SelectorMatch}};

/// Confidence multiplier for a test identifier selector
pub const TEST_ID_WEIGHT: f64 = 0.9;
/// Confidence multiplier for an id selector
pub const ID_WEIGHT: f64 = 0.8;
/// Confidence multiplier for a bare tag selector, which is rarely unique
pub const TAG_WEIGHT: f64 = 0.4;

/// Deterministic mapping from the single most similar candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedStrategy;

impl RuleBasedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectorMappingStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn propose(
        &self,
        old: &ElementContext,
        candidates: &[Candidate<'_>],
        _failure_hint: Option<&str>,
    ) -> SelectorMatch {
        let Some(best) = candidates.first() else {
            return SelectorMatch::unmapped(&old.selector, "No similar element found.");
        };

        let (selector, weight) = if let Some(value) = test_id(&best.element) {
            (format!("[data-testid='{}']", quoted_value(value)), TEST_ID_WEIGHT)
        } else if let Some(id) = element_id(&best.element) {
            (id_selector(id), ID_WEIGHT)
        } else {
            (tag_name(&best.element).to_string(), TAG_WEIGHT)
        };

        SelectorMatch::new(
            &old.selector,
            selector,
            best.score * weight,
            format!("Fallback mapping. Similarity: {:.2}.", best.score),
        )
    }
}

/// `#id` when the id is a plain CSS identifier, an attribute selector otherwise
fn id_selector(id: &str) -> String {
    if is_css_identifier(id) {
        format!("#{}", id)
    } else {
        format!("[id='{}']", quoted_value(id))
    }
}

fn is_css_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let starts_ok = match chars.next() {
        Some('-') => matches!(chars.clone().next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-'),
        Some(c) => c.is_ascii_alphabetic() || c == '_',
        None => false,
    };
    starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Escape a value for a single-quoted CSS string
fn quoted_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
