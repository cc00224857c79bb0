//! Captcha decoding: raw detections to an ordered character string.
//!
//! The detector returns one box per recognized character, usually with
//! duplicates. Decoding runs non-max suppression, sorts the survivors
//! left to right, and maps each class id to its character.

use thiserror::Error;

/// Number of character classes the model distinguishes (A-Z).
pub const CLASS_COUNT: u32 = 26;

/// Default IoU threshold above which two boxes count as duplicates.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.6;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The model reported a class id outside the known character set.
    #[error("unmapped detection class {0} (known classes: 0..{CLASS_COUNT})")]
    UnmappedClass(u32),
}

/// Axis-aligned bounding box, `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Intersection-over-Union with another box.
    ///
    /// Zero or negative overlap on either axis counts as no intersection.
    pub fn iou(&self, other: &BBox) -> f32 {
        let overlap_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let overlap_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let overlap = overlap_w * overlap_h;
        let union = self.area() + other.area() - overlap;
        if union > 0.0 { overlap / union } else { 0.0 }
    }
}

/// One raw detection from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub bbox: BBox,
    /// Confidence score in [0, 1].
    pub confidence: f32,
}

/// A decoded captcha: the string plus the detections it was read from.
///
/// `text` and `detections` correspond index for index, and the detections
/// are ordered by ascending `bbox.x1` (reading order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedResult {
    pub text: String,
    pub detections: Vec<Detection>,
}

/// Maps a detection class to its character (class 0 = 'A', 1 = 'B', ...).
fn class_to_char(class_id: u32) -> Result<char, DecodeError> {
    if class_id < CLASS_COUNT {
        Ok((b'A' + class_id as u8) as char)
    } else {
        Err(DecodeError::UnmappedClass(class_id))
    }
}

/// Greedy non-max suppression.
///
/// Repeatedly keeps the highest-confidence remaining detection and drops
/// every other detection overlapping it with IoU >= `iou_threshold`.
/// O(n^2), fine for captcha-sized inputs.
fn non_max_suppression(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut remaining = detections;
    // Stable sort keeps input order between equal confidences, which fixes
    // the tie-break when boxes overlap completely.
    remaining.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept = Vec::new();
    while !remaining.is_empty() {
        let best = remaining.remove(0);
        remaining.retain(|other| best.bbox.iou(&other.bbox) < iou_threshold);
        kept.push(best);
    }
    kept
}

/// Decodes one image's raw detections into a string.
///
/// Applies NMS, orders survivors left to right, and maps classes to
/// characters. Empty input decodes to an empty result.
pub fn decode(
    detections: Vec<Detection>,
    iou_threshold: f32,
) -> Result<DecodedResult, DecodeError> {
    let mut survivors = non_max_suppression(detections, iou_threshold);
    survivors.sort_by(|a, b| {
        a.bbox
            .x1
            .partial_cmp(&b.bbox.x1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut text = String::with_capacity(survivors.len());
    for det in &survivors {
        text.push(class_to_char(det.class_id)?);
    }

    Ok(DecodedResult {
        text,
        detections: survivors,
    })
}

/// Decodes a batch of images independently, one result per image.
pub fn decode_batch(
    per_image: Vec<Vec<Detection>>,
    iou_threshold: f32,
) -> Result<Vec<DecodedResult>, DecodeError> {
    per_image
        .into_iter()
        .map(|dets| decode(dets, iou_threshold))
        .collect()
}
