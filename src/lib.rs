pub mod api;
pub mod document_reader;
pub mod documents;
pub mod models;
pub mod processing;
pub mod utils;

pub use document_reader::DocumentReader;
