use crate::error::{HealError, Result};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from an element's text
pub const MAX_TEXT_CHARS: usize = 300;

/// Attribute carrying a stable test identifier
pub const TEST_ID_ATTRIBUTE: &str = "data-testid";

/// Snapshot of one DOM element resolved from a selector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementContext {
    /// Selector the element was resolved from
    pub selector: String,

    /// Serialized markup of the element including its children
    pub outer_html: String,

    /// Normalized text content, see [`normalized_text`]
    pub text_content: String,
}

impl ElementContext {
    /// Resolve the first element matching `selector` in `document`.
    ///
    /// Returns `None` when the selector matches nothing or cannot be parsed.
    pub fn resolve(document: &Html, selector: &str) -> Option<Self> {
        let parsed = match parse_selector(selector) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("{}", e);
                return None;
            }
        };

        document.select(&parsed).next().map(|element| Self::from_element(selector, element))
    }

    /// Build the context for an already located element
    pub fn from_element(selector: impl Into<String>, element: ElementRef<'_>) -> Self {
        Self { selector: selector.into(), outer_html: element.html(), text_content: normalized_text(element) }
    }
}

/// Parse a CSS selector, mapping the parser's borrowed error into an owned one
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| HealError::InvalidSelector { selector: selector.to_string(), reason: format!("{:?}", e) })
}

/// Collapse every run of whitespace into a single space and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element: trimmed text fragments joined by spaces, whitespace
/// collapsed, truncated to [`MAX_TEXT_CHARS`] characters
pub fn normalized_text(element: ElementRef<'_>) -> String {
    let joined = element.text().map(str::trim).filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined).chars().take(MAX_TEXT_CHARS).collect()
}

/// Value of the element's test identifier attribute, if non-empty
pub fn test_id<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    element.value().attr(TEST_ID_ATTRIBUTE).filter(|v| !v.is_empty())
}

/// Value of the element's id attribute, if non-empty
pub fn element_id<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    element.value().id().filter(|v| !v.is_empty())
}

/// Lower-case tag name of the element
pub fn tag_name<'a>(element: &ElementRef<'a>) -> &'a str {
    element.value().name()
}
