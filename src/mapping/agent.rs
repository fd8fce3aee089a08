use crate::{dom::{ElementContext, SimilarityMatcher},
            mapping::{llm::LlmStrategy, openai::OpenAiChat, rule_based::RuleBasedStrategy, FailureContext,
                      SelectorMappingStrategy, SelectorMatch, CONFIDENT_MATCH}};
use indexmap::IndexMap;
use scraper::Html;

/// Maps old selectors onto the new DOM with one strategy chosen at construction
pub struct SelectorAgent {
    strategy: Box<dyn SelectorMappingStrategy>,
    matcher: SimilarityMatcher,
}

impl SelectorAgent {
    /// Create an agent around an explicit strategy
    pub fn new(strategy: impl SelectorMappingStrategy + 'static) -> Self {
        Self { strategy: Box::new(strategy), matcher: SimilarityMatcher::new() }
    }

    /// Deterministic agent that never calls out
    pub fn rule_based() -> Self {
        Self::new(RuleBasedStrategy::new())
    }

    /// LLM agent when a non-empty credential is present, rule-based otherwise
    pub fn from_api_key(api_key: Option<&str>, model: &str) -> Self {
        let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
            log::info!("No API key provided. Using rule-based agent.");
            return Self::rule_based();
        };

        match OpenAiChat::new(key, model) {
            Ok(chat) => {
                log::info!("OpenAI client initialized for model '{}'.", model);
                Self::new(LlmStrategy::new(chat))
            }
            Err(e) => {
                log::warn!("{}. Falling back to rule-based agent.", e);
                Self::rule_based()
            }
        }
    }

    /// Name of the active strategy
    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Map one selector given the raw old and new HTML
    pub fn map(&self, old_selector: &str, old_html: &str, new_html: &str, failure_hint: Option<&str>) -> SelectorMatch {
        let old_document = Html::parse_document(old_html);
        let new_document = Html::parse_document(new_html);
        self.map_parsed(old_selector, &old_document, &new_document, failure_hint)
    }

    /// Map one selector against already parsed documents
    pub fn map_parsed(
        &self,
        old_selector: &str,
        old_document: &Html,
        new_document: &Html,
        failure_hint: Option<&str>,
    ) -> SelectorMatch {
        let Some(old) = ElementContext::resolve(old_document, old_selector) else {
            return SelectorMatch::unmapped(old_selector, "Original element not found.");
        };

        let candidates = self.matcher.rank(&old, new_document);
        if candidates.is_empty() {
            return SelectorMatch::unmapped(old_selector, "No similar element found.");
        }

        self.strategy.propose(&old, &candidates, failure_hint)
    }

    /// Map every named selector, in input order.
    ///
    /// The result has exactly the input's keys. `failure` only adds its hint to the
    /// selector it names; every other selector is mapped without hint context.
    pub fn map_all(
        &self,
        selectors: &IndexMap<String, String>,
        old_html: &str,
        new_html: &str,
        failure: Option<&FailureContext>,
    ) -> IndexMap<String, SelectorMatch> {
        let old_document = Html::parse_document(old_html);
        let new_document = Html::parse_document(new_html);

        log::info!("Mapping {} selectors with the {} strategy...", selectors.len(), self.strategy_name());

        selectors
            .iter()
            .map(|(name, selector)| {
                let hint = failure.filter(|f| &f.selector_name == name).map(|f| f.error_message.as_str());
                if hint.is_some() {
                    log::info!("  Re-healing high-priority selector: {}", name);
                } else {
                    log::info!("  Mapping: {} ('{}')", name, selector);
                }

                let result = self.map_parsed(selector, &old_document, &new_document, hint);
                if result.confidence > CONFIDENT_MATCH {
                    log::info!("  Confident match for '{}': '{}'", name, result.new_selector);
                } else {
                    log::warn!("  Low confidence for '{}': '{}' ({})", name, result.new_selector, result.reasoning);
                }

                (name.clone(), result)
            })
            .collect()
    }
}

impl std::fmt::Debug for SelectorAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorAgent").field("strategy", &self.strategy.name()).finish()
    }
}
