//! DOM snapshots and element matching
//!
//! This module provides everything that works on captured HTML:
//! - DomSnapshot: A captured page as persisted to disk
//! - ElementContext: The old element a selector resolved to
//! - similarity: Ratcliff/Obershelp text similarity
//! - SimilarityMatcher: Ranking of new-DOM elements against an old element

pub mod element;
pub mod matcher;
pub mod similarity;
pub mod snapshot;

pub use element::{ElementContext, MAX_TEXT_CHARS, TEST_ID_ATTRIBUTE};
pub use matcher::{Candidate, SIMILARITY_FLOOR, SimilarityMatcher};
pub use similarity::similarity;
pub use snapshot::DomSnapshot;

use scraper::Html;

/// Parse a full HTML document
pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}
