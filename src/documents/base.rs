use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Association, Record};

/// Threshold applied when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Opaque fuzzy-equality collaborator: returns a normalized similarity
/// score in [0, 1] between an expected field label and an observed line.
/// Injected so tests can pin exact behavior.
pub type SimilarityFn = Box<dyn Fn(&str, &str) -> f64 + Send + Sync>;

/// The default similarity primitive, normalized Levenshtein.
pub fn normalized_levenshtein() -> SimilarityFn {
    Box::new(|a, b| strsim::normalized_levenshtein(a, b))
}

lazy_static! {
    // Runs of whitespace and characters outside the word/backslash/space/
    // dot/dash set become line breaks.
    static ref SPLIT_PATTERN: Regex = Regex::new(r"\s{2,}|[^\w\\\s.\-]").unwrap();
    // Anything still outside the retained alphanumeric set is stripped.
    static ref STRIP_PATTERN: Regex = Regex::new(r"[^a-zA-Z0-9\s.\-]").unwrap();
}

/// Normalizes raw recognizer output into ordered, uppercased, non-empty
/// lines. Idempotent on its own output; line order follows the recognizer's
/// top-to-bottom emission.
pub fn clean_text(raw: &str) -> Vec<String> {
    let text = SPLIT_PATTERN.replace_all(raw, "\n").to_uppercase();
    let text = STRIP_PATTERN.replace_all(&text, "");
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Capability interface for one document variant.
///
/// Concrete variants supply the field association, validation, and cleaning
/// stages; the shared driver composes them into the `valid_text` /
/// `process_text` contract. A `None` from `process_text` is the normal
/// negative result — the document could not be read at this threshold —
/// not an error.
pub trait DocumentService: Send + Sync {
    /// Locates each declared field's raw value among the cleaned lines.
    /// Every declared label is present in the result, unset when no line
    /// bound it.
    fn associate(&self, lines: &[String], threshold: f64) -> Association;

    /// Confirms every required field is present and shaped as expected.
    fn valid_association(&self, association: &Association) -> bool;

    /// Post-processes a validated association into the final record,
    /// splitting composite fields and dropping unset ones. Returns `None`
    /// if a composite no longer re-matches its split pattern.
    fn clean_association(&self, association: Association) -> Option<Record>;

    fn valid_text(&self, text: &str, threshold: f64) -> bool {
        let lines = clean_text(text);
        self.valid_association(&self.associate(&lines, threshold))
    }

    fn process_text(&self, text: &str, threshold: f64) -> Option<Record> {
        let lines = clean_text(text);
        let association = self.associate(&lines, threshold);
        if self.valid_association(&association) {
            self.clean_association(association)
        } else {
            None
        }
    }
}
