use crate::{dom::{Candidate, ElementContext},
            error::{HealError, Result},
            mapping::{openai::ChatBackend, rule_based::RuleBasedStrategy, SelectorMappingStrategy, SelectorMatch}};
use serde_json::Value;

/// Candidates shown to the model
pub const MAX_PROMPT_CANDIDATES: usize = 5;

const SYSTEM_PROMPT: &str = r#"You are a senior test automation engineer. Your only job is to find the single best, most stable and maintainable CSS selector for a web element that has changed.

Analyze the old selector, its context, and the candidate elements from the new DOM.

Your response MUST be a valid JSON object with `new_selector`, `confidence` (0.0-1.0) and `reasoning`.

Selector priority:
1. Unique `data-testid`: the gold standard.
2. Composite selector: a `data-testid` on a parent combined with a stable child class (e.g. [data-testid='film-entry'] .film-name).
3. Unique `id`: good, but less preferred than `data-testid`.
4. Meaningful class name: only if it describes function, not appearance (.user-profile-card is good, .text-blue is bad).
5. NEVER use structural selectors that rely on `nth-child` or are long and brittle."#;

/// Asks a chat model for the replacement selector; any failure falls back to
/// [`RuleBasedStrategy`] for that selector only
#[derive(Debug)]
pub struct LlmStrategy<B> {
    backend: B,
    fallback: RuleBasedStrategy,
}

impl<B: ChatBackend> LlmStrategy<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, fallback: RuleBasedStrategy::new() }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn ask(
        &self,
        old: &ElementContext,
        candidates: &[Candidate<'_>],
        failure_hint: Option<&str>,
    ) -> Result<SelectorMatch> {
        let user = user_prompt(old, candidates, failure_hint)?;
        let raw = self.backend.complete_json(SYSTEM_PROMPT, &user)?;
        parse_reply(&old.selector, &raw)
    }
}

impl<B: ChatBackend> SelectorMappingStrategy for LlmStrategy<B> {
    fn name(&self) -> &str {
        "llm"
    }

    fn propose(
        &self,
        old: &ElementContext,
        candidates: &[Candidate<'_>],
        failure_hint: Option<&str>,
    ) -> SelectorMatch {
        match self.ask(old, candidates, failure_hint) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("LLM mapping for '{}' failed: {}. Falling back to rule-based method.", old.selector, e);
                self.fallback.propose(old, candidates, failure_hint)
            }
        }
    }
}

/// System instruction carrying the selector preference policy
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// User message: optional failure hint, old element context and the top candidates
pub fn user_prompt(old: &ElementContext, candidates: &[Candidate<'_>], failure_hint: Option<&str>) -> Result<String> {
    let mut prompt = String::from("I need to find a new CSS selector.\n");

    if let Some(hint) = failure_hint {
        prompt.push_str(&format!(
            "\nATTENTION: A previous attempt failed with this error:\n\"{}\"\nRe-evaluate with extreme care.\n",
            hint
        ));
    }

    prompt.push_str("\nOld Element Context:\n");
    prompt.push_str(&serde_json::to_string_pretty(old)?);
    prompt.push_str("\n\nTop potential candidates from the New DOM, ranked by text similarity:\n");

    for (i, candidate) in candidates.iter().take(MAX_PROMPT_CANDIDATES).enumerate() {
        let snippet = candidate.element.html().replace("```", "\\`\\`\\`");
        prompt.push_str(&format!("\n---\nCandidate #{}:\n{}\n", i + 1, snippet));
    }

    prompt.push_str("\n\nProvide the single best selector in the following JSON format:\n");
    prompt.push_str(r#"{ "new_selector": "...", "confidence": 0.0, "reasoning": "..." }"#);
    Ok(prompt)
}

/// Decode the model's JSON reply; missing fields take neutral defaults
fn parse_reply(original_selector: &str, raw: &str) -> Result<SelectorMatch> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value.as_object().ok_or_else(|| HealError::Llm(format!("Expected a JSON object, got: {}", raw)))?;

    let new_selector = object.get("new_selector").and_then(Value::as_str).unwrap_or_default().trim();

    let confidence = match object.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            s.trim().parse::<f64>().map_err(|_| HealError::Llm(format!("Non-numeric confidence: {}", s)))?
        }
        Some(other) => return Err(HealError::Llm(format!("Non-numeric confidence: {}", other))),
    };

    let reasoning = object.get("reasoning").and_then(Value::as_str).unwrap_or("N/A");

    Ok(SelectorMatch::new(original_selector, new_selector, confidence, reasoning))
}
