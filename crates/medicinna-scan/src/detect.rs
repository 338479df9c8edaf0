use std::sync::Arc;

use image::DynamicImage;
use medicinna_core::{DetectionFailure, ObjectDetector};
use medicinna_types::DetectionBox;

/// Pixel rectangle inside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Highest-confidence box; the first one wins a tie
pub fn select_best(boxes: &[DetectionBox]) -> Option<&DetectionBox> {
    boxes
        .iter()
        .filter(|b| !b.confidence.is_nan())
        .fold(None, |best: Option<&DetectionBox>, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        })
}

/// Crop rectangle for a centre-anchored box.
///
/// The origin is clamped to the image's top-left corner and the extent to its
/// bottom-right, so the rectangle always lies inside the image.
pub fn crop_rect(detection: &DetectionBox, image_width: u32, image_height: u32) -> CropRect {
    let x = (detection.x - detection.width / 2.0).max(0.0).round() as u32;
    let y = (detection.y - detection.height / 2.0).max(0.0).round() as u32;
    let width = detection.width.max(0.0).round() as u32;
    let height = detection.height.max(0.0).round() as u32;

    CropRect {
        x: x.min(image_width),
        y: y.min(image_height),
        width: width.min(image_width.saturating_sub(x)),
        height: height.min(image_height.saturating_sub(y)),
    }
}

pub fn crop_to_rect(image: &DynamicImage, rect: CropRect) -> Result<DynamicImage, DetectionFailure> {
    if rect.width == 0 || rect.height == 0 {
        return Err(DetectionFailure::EmptyCrop);
    }
    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// What the detector found and the crop taken from it
#[derive(Debug, Clone)]
pub struct Detection {
    pub best: DetectionBox,
    pub rect: CropRect,
    pub cropped: DynamicImage,
    pub box_count: usize,
}

/// Remote detection followed by a crop to the best box
#[derive(Clone)]
pub struct DetectAndCrop {
    detector: Arc<dyn ObjectDetector>,
}

impl DetectAndCrop {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self { detector }
    }

    /// `encoded` is what gets uploaded; `image` is the same picture decoded
    pub async fn detect_and_crop(
        &self,
        encoded: &[u8],
        image: &DynamicImage,
    ) -> Result<Detection, DetectionFailure> {
        let boxes = self.detector.detect(encoded).await?;
        let best = select_best(&boxes).ok_or(DetectionFailure::NoBoxes)?.clone();

        let rect = crop_rect(&best, image.width(), image.height());
        tracing::debug!(
            "Best of {} boxes: {:.2} confidence at {:?}",
            boxes.len(),
            best.confidence,
            rect
        );

        let cropped = crop_to_rect(image, rect)?;
        Ok(Detection {
            best,
            rect,
            cropped,
            box_count: boxes.len(),
        })
    }
}
