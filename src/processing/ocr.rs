use std::io::{Cursor, Write};

use crate::utils::DocumentError;
use image::{DynamicImage, GrayImage, ImageFormat};
use tesseract::Tesseract;

/// Opaque text-recognition collaborator: conditioned image in, raw text
/// (with embedded line breaks) out. Injected into the reader so tests can
/// substitute a deterministic stub.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String, DocumentError>;
}

/// Tesseract-backed recognizer. The engine reads from a file, so the
/// conditioned image is written to a scoped temp file that is removed on
/// every exit path when it drops.
pub struct TesseractRecognizer {
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: &str) -> Self {
        TesseractRecognizer {
            language: language.to_string(),
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String, DocumentError> {
        let mut encoded = Vec::new();
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| {
                DocumentError::ImageProcessing(format!("failed to encode image: {}", e))
            })?;

        let mut temp_file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| DocumentError::Recognition(format!("failed to create temp file: {}", e)))?;
        temp_file
            .write_all(&encoded)
            .map_err(|e| DocumentError::Recognition(format!("failed to write temp file: {}", e)))?;

        let image_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| {
                DocumentError::Recognition("failed to convert temp path to string".to_string())
            })?
            .to_string();

        let text = Tesseract::new(None, Some(&self.language))
            .map_err(|e| DocumentError::Recognition(format!("tesseract init error: {}", e)))?
            .set_image(&image_path)
            .map_err(|e| DocumentError::Recognition(format!("tesseract set image error: {}", e)))?
            .get_text()
            .map_err(|e| DocumentError::Recognition(format!("tesseract error: {}", e)))?;

        // temp_file drops here, removing the file on success and failure
        // paths alike.
        Ok(text)
    }
}
