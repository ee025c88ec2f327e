//! Descriptor extraction: photo in, zero-or-one face descriptor out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceDescriptor;
use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// SCRFD model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a decodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Anything that can turn a decoded photo into at most one face descriptor.
///
/// `Ok(None)` means no face was found, which is not an error.
pub trait DescriptorExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<FaceDescriptor>, ExtractError>;
}

/// SCRFD detection followed by ArcFace recognition of the most confident face.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl DescriptorExtractor for OnnxExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<FaceDescriptor>, ExtractError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.into_iter().next() else {
            return Ok(None);
        };

        let embedding = self.recognizer.extract(image, &face)?;
        tracing::trace!(confidence = face.confidence, "face descriptor extracted");
        Ok(Some(FaceDescriptor { face, embedding }))
    }
}

/// Decode an image file, sniffing the format from its content rather than its
/// extension (uploads are always stored as `.jpg`).
pub fn load_image(path: &Path) -> Result<RgbImage, DecodeError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgb8())
}

/// Decode an in-memory image payload.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png_payload() {
        let img = decode_image(&png_bytes([10, 20, 30])).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(*img.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn test_load_image_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1700000000000.jpg");
        std::fs::write(&path, png_bytes([200, 100, 50])).unwrap();

        let img = load_image(&path).unwrap();
        assert_eq!(*img.get_pixel(3, 3), Rgb([200, 100, 50]));
    }

    #[test]
    fn test_load_missing_models() {
        let err = OnnxExtractor::load(Path::new("/nonexistent-models")).err();
        assert!(matches!(
            err,
            Some(ExtractError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
