use crate::dom::{element::{normalized_text, ElementContext},
                 similarity::similarity};
use scraper::{ElementRef, Html};

/// Candidates scoring at or below this are noise
pub const SIMILARITY_FLOOR: f64 = 0.3;

/// Document containers the HTML parser always synthesizes; never a healing target
const DOCUMENT_CONTAINERS: [&str; 3] = ["html", "head", "body"];

/// An element of the new DOM paired with its text similarity to the old element
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Element in the new document
    pub element: ElementRef<'a>,

    /// Similarity in `(SIMILARITY_FLOOR, 1]`
    pub score: f64,
}

/// Ranks elements of a new document by text similarity to an old element
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityMatcher;

impl SimilarityMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Every element of `document` scoring above [`SIMILARITY_FLOOR`] against
    /// `old.text_content`, most similar first; equal scores keep document order.
    /// `html`, `head` and `body` are skipped.
    pub fn rank<'a>(&self, old: &ElementContext, document: &'a Html) -> Vec<Candidate<'a>> {
        if old.text_content.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate<'a>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| !DOCUMENT_CONTAINERS.contains(&element.value().name()))
            .filter_map(|element| {
                let score = similarity(&old.text_content, &normalized_text(element));
                (score > SIMILARITY_FLOOR).then_some(Candidate { element, score })
            })
            .collect();

        // sort_by is stable, so ties stay in document order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }
}
