//! Detector adapter: runs the character-detection ONNX model.
//!
//! Wraps an ONNX Runtime session behind the `Detector` trait so the
//! decoding pipeline (and the bot on top of it) never sees inference
//! details and tests can substitute a scripted detector.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;

use super::decode::{BBox, Detection};

/// Produces raw per-image detections for a batch of images.
pub trait Detector {
    fn predict(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<Detection>>>;
}

/// Square input edge the model was exported with.
const INPUT_SIZE: u32 = 640;

/// Detections below this score are dropped before decoding.
const CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Letterbox padding fill, the YOLO convention.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Input tensor name used by ultralytics ONNX exports.
const INPUT_NAME: &str = "images";

/// YOLO-family detector backed by ONNX Runtime.
pub struct OrtDetector {
    session: Session,
    input_size: u32,
}

impl OrtDetector {
    /// Loads the model from disk and builds the inference session.
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            return Err(anyhow!(
                "model path ({}) does not exist",
                model_path.display()
            ));
        }

        log::info!("Loading detection model from {}", model_path.display());
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("{e}"))?
            .with_intra_threads(4)
            .map_err(|e| anyhow!("{e}"))?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;

        Ok(Self {
            session,
            input_size: INPUT_SIZE,
        })
    }

    /// Letterbox-resizes an image into a CHW float tensor.
    ///
    /// Returns the tensor together with the scale and the (x, y) padding
    /// needed to map detections back to source coordinates.
    fn preprocess(&self, image: &DynamicImage) -> (Array4<f32>, f32, f32, f32) {
        let (width, height) = image.dimensions();
        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).max(1);
        let new_h = ((height as f32 * scale).round() as u32).max(1);
        let pad_x = (size as f32 - new_w as f32) / 2.0;
        let pad_y = (size as f32 - new_h as f32) / 2.0;

        let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

        let mut tensor = Array4::from_elem((1, 3, size as usize, size as usize), PAD_VALUE);
        let x_off = pad_x.floor() as usize;
        let y_off = pad_y.floor() as usize;
        for (x, y, pixel) in resized.enumerate_pixels() {
            let tx = x as usize + x_off;
            let ty = y as usize + y_off;
            tensor[[0, 0, ty, tx]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, ty, tx]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, ty, tx]] = pixel[2] as f32 / 255.0;
        }

        (tensor, scale, pad_x, pad_y)
    }

    /// Decodes one YOLO output head of shape `[1, 4 + classes, anchors]`.
    fn parse_output(
        shape: &[usize],
        data: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        image_w: f32,
        image_h: f32,
    ) -> Result<Vec<Detection>> {
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!(
                "unexpected model output shape {:?}, expected [1, 4 + classes, anchors]",
                shape
            ));
        }
        let rows = shape[1];
        let anchors = shape[2];
        let classes = rows - 4;
        let at = |row: usize, col: usize| data[row * anchors + col];

        let mut detections = Vec::new();
        for a in 0..anchors {
            let mut best_class = 0u32;
            let mut best_score = f32::MIN;
            for c in 0..classes {
                let score = at(4 + c, a);
                if score > best_score {
                    best_score = score;
                    best_class = c as u32;
                }
            }
            if best_score < CONFIDENCE_THRESHOLD {
                continue;
            }

            // Center-format box in letterboxed coordinates.
            let cx = at(0, a);
            let cy = at(1, a);
            let w = at(2, a);
            let h = at(3, a);
            let x1 = ((cx - w / 2.0 - pad_x) / scale).clamp(0.0, image_w);
            let y1 = ((cy - h / 2.0 - pad_y) / scale).clamp(0.0, image_h);
            let x2 = ((cx + w / 2.0 - pad_x) / scale).clamp(0.0, image_w);
            let y2 = ((cy + h / 2.0 - pad_y) / scale).clamp(0.0, image_h);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            detections.push(Detection {
                class_id: best_class,
                bbox: BBox::new(x1, y1, x2, y2),
                confidence: best_score,
            });
        }

        Ok(detections)
    }

    fn predict_one(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let (tensor, scale, pad_x, pad_y) = self.preprocess(image);
        let (width, height) = image.dimensions();

        let output_name = self
            .session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .context("model declares no outputs")?;

        let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let data = tensor
            .as_slice()
            .context("input tensor is not contiguous")?;
        let tensor_ref = TensorRef::from_array_view((dims, data))?;

        let inputs: SessionInputs<'_, '_, 0> =
            SessionInputs::ValueMap(vec![(Cow::Borrowed(INPUT_NAME), tensor_ref.into())]);
        let outputs = self.session.run(inputs).context("inference failed")?;

        let (out_shape, out_data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .context("model output is not an f32 tensor")?;
        let out_shape: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();

        Self::parse_output(
            &out_shape,
            out_data,
            scale,
            pad_x,
            pad_y,
            width as f32,
            height as f32,
        )
    }
}

impl Detector for OrtDetector {
    fn predict(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<Detection>>> {
        images.iter().map(|img| self.predict_one(img)).collect()
    }
}
