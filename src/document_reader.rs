use std::collections::HashMap;

use log::debug;

use crate::documents::{BasicService, CniService, DocumentService};
use crate::models::{ConditionParams, Record};
use crate::processing::{ImageConditioner, TextRecognizer};
use crate::utils::DocumentError;

/// Orchestrates the full pipeline: decode, condition, recognize, then hand
/// the raw text to the selected document variant.
///
/// Holds only immutable state — the conditioning parameters and the
/// name -> service registry built once at construction — so a single reader
/// is safely shared across concurrent requests.
pub struct DocumentReader {
    recognizer: Box<dyn TextRecognizer>,
    services: HashMap<String, Box<dyn DocumentService>>,
    params: ConditionParams,
}

impl DocumentReader {
    /// Builds a reader with the default registry: `basic` and `cni`.
    pub fn new(recognizer: Box<dyn TextRecognizer>, params: ConditionParams) -> Self {
        let mut services: HashMap<String, Box<dyn DocumentService>> = HashMap::new();
        services.insert("basic".to_string(), Box::new(BasicService::new()));
        services.insert("cni".to_string(), Box::new(CniService::new()));
        DocumentReader {
            recognizer,
            services,
            params,
        }
    }

    /// Registers an additional document variant under `name`.
    pub fn with_service(mut self, name: &str, service: Box<dyn DocumentService>) -> Self {
        self.services.insert(name.to_lowercase(), service);
        self
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(&name.to_lowercase())
    }

    /// Runs the pipeline and returns the cleaned record, or `None` when the
    /// document could not be validated at this threshold.
    pub fn read(
        &self,
        service_name: &str,
        image_bytes: &[u8],
        threshold: f64,
    ) -> Result<Option<Record>, DocumentError> {
        let (service, text) = self.recognize(service_name, image_bytes)?;
        Ok(service.process_text(&text, threshold))
    }

    /// Like `read`, but only reports whether the document validates.
    pub fn valid(
        &self,
        service_name: &str,
        image_bytes: &[u8],
        threshold: f64,
    ) -> Result<bool, DocumentError> {
        let (service, text) = self.recognize(service_name, image_bytes)?;
        Ok(service.valid_text(&text, threshold))
    }

    fn recognize(
        &self,
        service_name: &str,
        image_bytes: &[u8],
    ) -> Result<(&dyn DocumentService, String), DocumentError> {
        let service = self
            .services
            .get(&service_name.to_lowercase())
            .ok_or_else(|| DocumentError::UnknownService(service_name.to_string()))?;

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| DocumentError::ImageProcessing(format!("failed to decode image: {}", e)))?
            .to_rgb8();
        debug!(
            "conditioning {}x{} image for service '{}'",
            image.width(),
            image.height(),
            service_name
        );

        let conditioned = ImageConditioner::condition(&image, &self.params)?;
        let text = self.recognizer.recognize(&conditioned)?;
        debug!("recognized {} bytes of text", text.len());

        Ok((service.as_ref(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Recognizer that ignores pixels and returns a fixed transcript.
    struct StubRecognizer(String);

    impl TextRecognizer for StubRecognizer {
        fn recognize(&self, _image: &image::GrayImage) -> Result<String, DocumentError> {
            Ok(self.0.clone())
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(24, 24, Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn card_transcript() -> String {
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
    fn read_returns_the_record_for_a_readable_card() {
        let reader = DocumentReader::new(
            Box::new(StubRecognizer(card_transcript())),
            ConditionParams::default(),
        );
        let record = reader.read("cni", &png_bytes(), 0.75).unwrap().unwrap();
        assert_eq!(record["RUN"], "12.749.625-K");
        assert_eq!(record["APELLIDOS"], "FREDEZ VIDAL");
    }

    #[test]
    fn read_returns_none_for_an_unreadable_card() {
        let reader = DocumentReader::new(
            Box::new(StubRecognizer("illegible scribbles".to_string())),
            ConditionParams::default(),
        );
        let result = reader.read("cni", &png_bytes(), 0.75).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn unknown_service_is_an_error() {
        let reader = DocumentReader::new(
            Box::new(StubRecognizer(String::new())),
            ConditionParams::default(),
        );
        assert!(matches!(
            reader.read("passport", &png_bytes(), 0.75),
            Err(DocumentError::UnknownService(_))
        ));
    }

    #[test]
    fn service_lookup_is_case_insensitive() {
        let reader = DocumentReader::new(
            Box::new(StubRecognizer(card_transcript())),
            ConditionParams::default(),
        );
        assert!(reader.valid("CNI", &png_bytes(), 0.75).unwrap());
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        let reader = DocumentReader::new(
            Box::new(StubRecognizer(String::new())),
            ConditionParams::default(),
        );
        assert!(matches!(
            reader.read("basic", b"not an image", 0.75),
            Err(DocumentError::ImageProcessing(_))
        ));
    }
}
