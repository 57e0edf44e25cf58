use crate::documents::base::DocumentService;
use crate::models::{Association, Record};

const INTERPRETED: &str = "interpreted";

/// Generic pass-through variant for documents without a declared template:
/// reports whatever the recognizer produced, cleaned, with no structural
/// validation.
pub struct BasicService;

impl BasicService {
    pub fn new() -> Self {
        BasicService
    }
}

impl Default for BasicService {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentService for BasicService {
    fn associate(&self, lines: &[String], _threshold: f64) -> Association {
        let mut association = Association::new();
        association.insert(INTERPRETED.to_string(), Some(lines.join("\n")));
        association
    }

    /// No association is really made, so nothing can be invalid.
    fn valid_association(&self, _association: &Association) -> bool {
        true
    }

    fn clean_association(&self, association: Association) -> Option<Record> {
        Some(
            association
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_cleaned_lines_verbatim() {
        let service = BasicService::new();
        let record = service.process_text("hello   world!!\nfoo", 0.75).unwrap();
        assert_eq!(record["interpreted"], "HELLO\nWORLD\nFOO");
    }

    #[test]
    fn empty_text_still_processes() {
        let service = BasicService::new();
        assert!(service.valid_text("", 0.75));
        let record = service.process_text("", 0.75).unwrap();
        assert_eq!(record["interpreted"], "");
    }
}
