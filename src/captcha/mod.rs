//! Captcha solving: object-detection inference plus decoding.

pub mod decode;
pub mod detector;

use image::DynamicImage;
use thiserror::Error;

pub use decode::{BBox, DecodeError, DecodedResult, Detection};
pub use detector::{Detector, OrtDetector};

use decode::DEFAULT_IOU_THRESHOLD;

#[derive(Debug, Error)]
pub enum CaptchaError {
    /// Decoding failed on otherwise valid detector output.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The detector itself failed (model load, inference, bad output).
    #[error("detector failure: {0}")]
    Inference(anyhow::Error),
}

impl From<anyhow::Error> for CaptchaError {
    fn from(e: anyhow::Error) -> Self {
        CaptchaError::Inference(e)
    }
}

/// Detector and decoder composed into a captcha solver.
pub struct CaptchaModel {
    detector: Box<dyn Detector>,
    iou_threshold: f32,
}

impl CaptchaModel {
    /// Loads the ONNX model at `path` behind the default detector.
    pub fn load(path: &std::path::Path) -> Result<Self, CaptchaError> {
        Ok(Self::with_detector(Box::new(OrtDetector::load(path)?)))
    }

    /// Builds a solver around any detector, used by tests.
    pub fn with_detector(detector: Box<dyn Detector>) -> Self {
        Self {
            detector,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }

    /// Decodes one captcha image into its text plus retained detections.
    pub fn solve_detailed(
        &mut self,
        image: &DynamicImage,
    ) -> Result<DecodedResult, CaptchaError> {
        let mut batch = self.solve_batch(std::slice::from_ref(image))?;
        Ok(batch.remove(0))
    }

    /// Decodes one captcha image into its text.
    pub fn solve(&mut self, image: &DynamicImage) -> Result<String, CaptchaError> {
        Ok(self.solve_detailed(image)?.text)
    }

    /// Decodes several captcha images independently.
    pub fn solve_batch(
        &mut self,
        images: &[DynamicImage],
    ) -> Result<Vec<DecodedResult>, CaptchaError> {
        let raw = self.detector.predict(images)?;
        Ok(decode::decode_batch(raw, self.iou_threshold)?)
    }
}
