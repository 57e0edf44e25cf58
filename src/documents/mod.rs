pub mod base;
pub mod basic;
pub mod cni;

pub use base::{clean_text, normalized_levenshtein, DocumentService, SimilarityFn, DEFAULT_THRESHOLD};
pub use basic::BasicService;
pub use cni::CniService;
