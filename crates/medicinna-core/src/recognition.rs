use async_trait::async_trait;
use image::DynamicImage;
use medicinna_types::{
    BatchCodeCandidate, CameraConstraints, DetectionBox, VerificationOutcome,
};

use crate::error::{DecodeFailure, DetectionFailure, DeviceError, NetworkFailure, OcrFailure};
use crate::progress::ProgressReporter;

/// Reads a machine-readable code (1D barcode, 2D matrix) from a still image
pub trait OpticalDecoder: Send + Sync {
    /// Single attempt, deterministic for a given image
    fn decode(&self, image: &DynamicImage) -> Result<String, DecodeFailure>;

    /// Decoder name for logs
    fn name(&self) -> &str;
}

/// Opens live camera feeds
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Acquire the camera matching `constraints`
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError>;
}

/// An open camera feed. Owned by exactly one stream decoder.
#[async_trait]
pub trait CameraStream: Send {
    /// Grab the most recent frame
    async fn next_frame(&mut self) -> Result<DynamicImage, DeviceError>;

    /// Release the hardware
    async fn close(&mut self) -> Result<(), DeviceError>;
}

/// Optical character recognition over a still image
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize all text in `image`, reporting progress as it goes
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        progress: &ProgressReporter,
    ) -> Result<String, OcrFailure>;
}

/// External object detection service
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Submit an encoded image, get back every predicted box
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectionBox>, DetectionFailure>;
}

/// Backend verification call. Every successful acquisition triggers it once.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, code: &BatchCodeCandidate) -> Result<VerificationOutcome, NetworkFailure>;
}
