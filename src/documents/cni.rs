use lazy_static::lazy_static;
use regex::Regex;

use crate::documents::base::{normalized_levenshtein, DocumentService, SimilarityFn};
use crate::models::{Association, Record};

const RUN: &str = "RUN";
const LASTNAMES: &str = "APELLIDOS";
const NAMES: &str = "NOMBRES";
const NATIONALITY_SEX: &str = "NACIONALIDAD SEXO";
const NATIONALITY: &str = "NACIONALIDAD";
const SEX: &str = "SEXO";
const BIRTH_DOC: &str = "FECHA DE NACIMIENTO NUMERO DOCUMENTO";
const ISSUE_DUE: &str = "FECHA DE EMISION FECHA DE VENCIMIENTO";

const BIRTH_DATE: &str = "FECHA DE NACIMIENTO";
const DOCUMENT_NUMBER: &str = "NUMERO DOCUMENTO";
const ISSUE_DATE: &str = "FECHA DE EMISION";
const DUE_DATE: &str = "FECHA DE VENCIMIENTO";

lazy_static! {
    // Anchored at line start: a label prefix, then 10-12 characters of
    // digits, dots, dashes and the K check letter.
    static ref RUN_PATTERN: Regex = Regex::new(r"^\w+\s?([\dK.\-]{10,12})").unwrap();
    static ref NATIONALITY_SEX_PATTERN: Regex = Regex::new(r"^(\w+)\s([FM])").unwrap();
    // Day fields accept one or two digits; issue dates like "1 SEP 2013"
    // appear on real cards.
    static ref BIRTH_DOC_PATTERN: Regex =
        Regex::new(r"^(\d{1,2} \w{3} \d{4}) (\d.+)").unwrap();
    static ref ISSUE_DUE_PATTERN: Regex =
        Regex::new(r"^(\d{1,2} \w{3} \d{4}) (\d{1,2} \w{3} \d{4})").unwrap();
}

/// Cedula Nacional de Identidad (Chilean national ID card) service.
///
/// The field template assumes the card's printed layout as emitted by the
/// recognizer, label line first, value on the following line(s):
///
/// ```text
/// RUN 12.749.625-K
/// APELLIDOS / <lastname 1> / <lastname 2>
/// NOMBRES / <given names>
/// NACIONALIDAD SEXO / CHILENA F
/// FECHA DE NACIMIENTO NUMERO DOCUMENTO / 21 FEB 1982 100000001
/// FECHA DE EMISION FECHA DE VENCIMIENTO / 1 SEP 2013 10 AGO 2023
/// ```
///
/// `NACIONALIDAD` and `SEXO` are also declared as separate labels because
/// the recognizer sometimes splits the combined header onto two lines.
pub struct CniService {
    /// Labels to find and how many lines past the match the value lives.
    /// Scan order matters: a truncated line list abandons the pass
    /// mid-template and later labels stay unset.
    to_find: Vec<(&'static str, usize)>,
    similarity: SimilarityFn,
}

impl CniService {
    pub fn new() -> Self {
        Self::with_similarity(normalized_levenshtein())
    }

    /// Constructs the service with a caller-supplied similarity primitive.
    pub fn with_similarity(similarity: SimilarityFn) -> Self {
        CniService {
            to_find: vec![
                (RUN, 0),
                (LASTNAMES, 1),
                (NAMES, 1),
                (NATIONALITY_SEX, 1),
                (NATIONALITY, 2),
                (SEX, 1),
                (BIRTH_DOC, 1),
                (ISSUE_DUE, 1),
            ],
            similarity,
        }
    }

    fn field<'a>(association: &'a Association, key: &str) -> Option<&'a str> {
        association.get(key).and_then(|value| value.as_deref())
    }
}

impl Default for CniService {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentService for CniService {
    /// Scans label-by-label, then line-by-line; a similarity hit binds the
    /// line at the label's offset (last match wins). `APELLIDOS` binds the
    /// two following lines joined, since surnames occupy two physical
    /// lines. Any line shaped like a RUN binds the `RUN` field regardless
    /// of similarity — the ID number is usually OCR'd as one inline token.
    ///
    /// Walking past the end of the line list abandons the pass and returns
    /// the association accumulated so far; validation will reject the
    /// incomplete result.
    fn associate(&self, lines: &[String], threshold: f64) -> Association {
        let mut association: Association = self
            .to_find
            .iter()
            .map(|(label, _)| (label.to_string(), None))
            .collect();

        for (label, offset) in &self.to_find {
            for (j, line) in lines.iter().enumerate() {
                if (self.similarity)(label, line) >= threshold {
                    if *label == LASTNAMES {
                        let (Some(first), Some(second)) = (lines.get(j + 1), lines.get(j + 2))
                        else {
                            return association;
                        };
                        association.insert(
                            LASTNAMES.to_string(),
                            Some(format!("{} {}", first, second)),
                        );
                    } else {
                        let Some(value) = lines.get(j + offset) else {
                            return association;
                        };
                        association.insert(label.to_string(), Some(value.clone()));
                    }
                } else if RUN_PATTERN.is_match(line) {
                    association.insert(RUN.to_string(), Some(line.clone()));
                }
            }
        }
        association
    }

    fn valid_association(&self, association: &Association) -> bool {
        let valid_run = Self::field(association, RUN)
            .map_or(false, |run| RUN_PATTERN.is_match(run));
        // Names have no structural shape to check; presence is enough.
        let valid_lastname = Self::field(association, LASTNAMES).is_some();
        let valid_name = Self::field(association, NAMES).is_some();
        // The combined header may come through as one line or two.
        let valid_nationality_sex = Self::field(association, NATIONALITY_SEX).is_some()
            || (Self::field(association, NATIONALITY).is_some()
                && Self::field(association, SEX).is_some());
        let valid_birth_doc = Self::field(association, BIRTH_DOC)
            .map_or(false, |value| BIRTH_DOC_PATTERN.is_match(value));
        let valid_issue_due = Self::field(association, ISSUE_DUE)
            .map_or(false, |value| ISSUE_DUE_PATTERN.is_match(value));

        valid_run
            && valid_lastname
            && valid_name
            && valid_nationality_sex
            && valid_birth_doc
            && valid_issue_due
    }

    /// Splits the composite fields into their final top-level keys and
    /// reduces `RUN` to the bare number. Only called on a validated
    /// association; a pattern that still fails to re-match (the separate
    /// `NACIONALIDAD` line can carry an arbitrary value) yields `None`.
    fn clean_association(&self, association: Association) -> Option<Record> {
        let mut record: Record = association
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();

        // Nationality and sex: prefer the separately-matched line, fall
        // back to the combined header.
        let source = if record.contains_key(NATIONALITY) {
            record.get(NATIONALITY).cloned()
        } else {
            record.remove(NATIONALITY_SEX)
        }?;
        let captures = NATIONALITY_SEX_PATTERN.captures(&source)?;
        record.insert(NATIONALITY.to_string(), captures[1].to_string());
        record.insert(SEX.to_string(), captures[2].to_string());

        let run = record.get(RUN).cloned()?;
        let captures = RUN_PATTERN.captures(&run)?;
        record.insert(RUN.to_string(), captures[1].to_string());

        let birth_doc = record.remove(BIRTH_DOC)?;
        let captures = BIRTH_DOC_PATTERN.captures(&birth_doc)?;
        record.insert(BIRTH_DATE.to_string(), captures[1].to_string());
        record.insert(DOCUMENT_NUMBER.to_string(), captures[2].to_string());

        let issue_due = record.remove(ISSUE_DUE)?;
        let captures = ISSUE_DUE_PATTERN.captures(&issue_due)?;
        record.insert(ISSUE_DATE.to_string(), captures[1].to_string());
        record.insert(DUE_DATE.to_string(), captures[2].to_string());

        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_text() -> String {
        [
            "RUN 12.749.625-K",
            "APELLIDOS",
            "FREDEZ",
            "VIDAL",
            "NOMBRES",
            "MARCELA CAROLINA",
            "NACIONALIDAD SEXO",
            "CHILENA F",
            "FECHA DE NACIMIENTO NUMERO DOCUMENTO",
            "21 FEB 1982 100000001",
            "FECHA DE EMISION FECHA DE VENCIMIENTO",
            "1 SEP 2013 10 AGO 2023",
        ]
        .join("\n")
    }

    #[test]
    fn associate_with_no_lines_leaves_every_field_unset() {
        let service = CniService::new();
        let association = service.associate(&[], 0.75);
        assert_eq!(association.len(), 8);
        assert!(association.values().all(|value| value.is_none()));
    }

    #[test]
    fn process_text_extracts_the_full_record() {
        let service = CniService::new();
        let record = service.process_text(&card_text(), 0.75).unwrap();

        assert_eq!(record["RUN"], "12.749.625-K");
        assert_eq!(record["APELLIDOS"], "FREDEZ VIDAL");
        assert_eq!(record["NOMBRES"], "MARCELA CAROLINA");
        assert_eq!(record["NACIONALIDAD"], "CHILENA");
        assert_eq!(record["SEXO"], "F");
        assert_eq!(record["FECHA DE NACIMIENTO"], "21 FEB 1982");
        assert_eq!(record["NUMERO DOCUMENTO"], "100000001");
        assert_eq!(record["FECHA DE EMISION"], "1 SEP 2013");
        assert_eq!(record["FECHA DE VENCIMIENTO"], "10 AGO 2023");
        assert_eq!(record.len(), 9);
    }

    #[test]
    fn valid_text_accepts_the_reference_card() {
        let service = CniService::new();
        assert!(service.valid_text(&card_text(), 0.75));
    }

    #[test]
    fn valid_text_tolerates_ocr_noise_in_labels() {
        // Misread labels close enough for normalized Levenshtein at 0.75.
        let noisy = card_text()
            .replace("APELLIDOS\n", "APELUDOS\n")
            .replace("NOMBRES\n", "NOMBRES.\n");
        assert!(CniService::new().valid_text(&noisy, 0.75));
    }

    #[test]
    fn missing_document_number_invalidates() {
        let text = card_text()
            .replace("FECHA DE NACIMIENTO NUMERO DOCUMENTO\n21 FEB 1982 100000001\n", "");
        let service = CniService::new();
        assert!(!service.valid_text(&text, 0.75));
        assert!(service.process_text(&text, 0.75).is_none());
    }

    #[test]
    fn perfect_threshold_rejects_near_miss_labels() {
        // Every label line slightly off; at threshold 1.0 nothing binds.
        let text = card_text()
            .replace("APELLIDOS", "APELLIDO5")
            .replace("NOMBRES", "N0MBRES")
            .replace("NACIONALIDAD SEXO", "NACI0NALIDAD SEX0")
            .replace("FECHA DE NACIMIENTO NUMERO DOCUMENTO", "FECHA DE NACIMIENT0 NUMERO DOCUMENT0")
            .replace("FECHA DE EMISION FECHA DE VENCIMIENTO", "FECHA DE EMISI0N FECHA DE VENCIMIENT0");
        assert!(!CniService::new().valid_text(&text, 1.0));
    }

    #[test]
    fn run_binds_by_shape_without_a_label_match() {
        let service = CniService::new();
        let lines = vec!["RUN 9.932.656-5".to_string()];
        let association = service.associate(&lines, 0.99);
        assert_eq!(
            association["RUN"].as_deref(),
            Some("RUN 9.932.656-5")
        );
    }

    #[test]
    fn truncated_lines_return_a_partial_association() {
        let service = CniService::new();
        // Label present but its value line is missing entirely.
        let lines = vec![
            "RUN 12.749.625-K".to_string(),
            "APELLIDOS".to_string(),
        ];
        let association = service.associate(&lines, 0.75);
        assert_eq!(association["APELLIDOS"], None);
        assert!(!service.valid_association(&association));
    }

    #[test]
    fn split_nationality_and_sex_lines_validate_together() {
        let text = card_text().replace(
            "NACIONALIDAD SEXO\nCHILENA F",
            "NACIONALIDAD\nSEXO\nCHILENA F",
        );
        let service = CniService::new();
        let record = service.process_text(&text, 0.75).unwrap();
        assert_eq!(record["NACIONALIDAD"], "CHILENA");
        assert_eq!(record["SEXO"], "F");
    }

    #[test]
    fn empty_text_is_invalid() {
        assert!(!CniService::new().valid_text("", 0.75));
    }
}
