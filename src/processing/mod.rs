pub mod conditioner;
pub mod ocr;

pub use conditioner::ImageConditioner;
pub use ocr::{TesseractRecognizer, TextRecognizer};
