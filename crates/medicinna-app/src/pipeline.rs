use std::future::Future;
use std::sync::Arc;

use image::DynamicImage;
use kanal::AsyncSender;
use medicinna_core::{
    AcquisitionError, DecodeFailure, DetectionFailure, DeviceError, OcrFailure, ProgressReporter,
    Verifier, extract_batch_code,
};
use medicinna_scan::{
    CameraStreamDecoder, DetectAndCrop, PendingScan, StaticImageDecoder, TextExtractionEngine,
    load_image,
};
use medicinna_types::{AppEvent, AttemptId, BatchCodeCandidate, RecognitionResult, VerificationOutcome};
use tokio_util::sync::CancellationToken;

/// One acquisition attempt: its identity and the token that abandons it
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: AttemptId,
    pub cancel: CancellationToken,
}

impl Attempt {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            id: AttemptId::new(),
            cancel,
        }
    }
}

/// A code that made it through verification
#[derive(Debug, Clone, PartialEq)]
pub struct Verified {
    pub code: BatchCodeCandidate,
    pub outcome: VerificationOutcome,
}

/// The recognition strategies and the verifier they feed
pub struct Pipeline {
    pub camera: CameraStreamDecoder,
    pub still: StaticImageDecoder,
    pub text: TextExtractionEngine,
    pub detect: Option<DetectAndCrop>,
    pub verifier: Arc<dyn Verifier>,
}

impl Pipeline {
    pub fn manual(input: &str) -> Result<BatchCodeCandidate, AcquisitionError> {
        BatchCodeCandidate::from_input(input).ok_or(AcquisitionError::EmptyInput)
    }

    /// Optical decode of the upload first; OCR and extraction only if that misses
    pub async fn ocr_upload(
        &self,
        encoded: &[u8],
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<BatchCodeCandidate, AcquisitionError> {
        let image = load_blocking(encoded)
            .await
            .map_err(|e| AcquisitionError::Ocr(OcrFailure::Engine(e.to_string())))?;

        if let Some(code) = self.still_decode(image.clone()).await {
            tracing::debug!("Upload decoded optically, skipping OCR");
            return Ok(code);
        }

        let outcome = self.text.recognize(&image, cancel, progress).await?;
        let code = extract_batch_code(&outcome.raw_text).ok_or(OcrFailure::NoCandidate)?;
        Ok(code)
    }

    /// Detect, crop to the best box and decode; the full image is the fallback
    pub async fn ai_smart_scan(&self, encoded: &[u8]) -> Result<BatchCodeCandidate, AcquisitionError> {
        let Some(detect) = &self.detect else {
            return Err(DetectionFailure::Service("no detector configured".to_string()).into());
        };

        let image = load_blocking(encoded)
            .await
            .map_err(|e| DetectionFailure::InvalidImage(e.to_string()))?;

        match detect.detect_and_crop(encoded, &image).await {
            Ok(detection) => {
                if let Some(code) = self.still_decode(Arc::new(detection.cropped)).await {
                    return Ok(code);
                }
                tracing::debug!(
                    "Nothing readable in {}x{} crop, trying the full image",
                    detection.rect.width,
                    detection.rect.height
                );
            }
            Err(DetectionFailure::EmptyCrop) => {
                tracing::debug!("Best box lies outside the image, trying the full image");
            }
            Err(e) => return Err(e.into()),
        }

        self.still_decode(image)
            .await
            .ok_or(AcquisitionError::Unreadable)
    }

    /// One optical decode on the blocking pool
    async fn still_decode(&self, image: Arc<DynamicImage>) -> Option<BatchCodeCandidate> {
        let still = self.still.clone();
        match tokio::task::spawn_blocking(move || still.decode(&image)).await {
            Ok(result) => result.decoded().and_then(BatchCodeCandidate::from_input),
            Err(e) => {
                tracing::error!("Decode task failed: {}", e);
                None
            }
        }
    }
}

/// Decode an upload on the blocking pool
async fn load_blocking(encoded: &[u8]) -> Result<Arc<DynamicImage>, DecodeFailure> {
    let bytes = encoded.to_vec();
    tokio::task::spawn_blocking(move || load_image(&bytes).map(Arc::new))
        .await
        .map_err(|e| DecodeFailure::InvalidImage(format!("decode task failed: {e}")))?
}

/// Turn what the camera stream handed back into a code
pub async fn camera_result(pending: PendingScan) -> Result<BatchCodeCandidate, AcquisitionError> {
    match pending.wait().await {
        Some(RecognitionResult::DecodedText(text)) => {
            BatchCodeCandidate::from_input(&text).ok_or(AcquisitionError::NoBatchCode)
        }
        Some(RecognitionResult::DeviceError(reason)) => Err(DeviceError::Other(reason).into()),
        Some(RecognitionResult::NoMatch) => Err(AcquisitionError::NoBatchCode),
        None => Err(AcquisitionError::Cancelled),
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, AcquisitionError>>,
) -> Result<T, AcquisitionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AcquisitionError::Cancelled),
        result = work => result,
    }
}

/// Run one acquisition strategy and verify what it finds.
///
/// The verifier is called at most once, and never for an attempt that was
/// cancelled before a code turned up.
pub async fn acquire_and_verify(
    attempt: &Attempt,
    acquire: impl Future<Output = Result<BatchCodeCandidate, AcquisitionError>>,
    verifier: &dyn Verifier,
    events: &AsyncSender<AppEvent>,
) -> Result<Verified, AcquisitionError> {
    let code = cancellable(&attempt.cancel, acquire).await?;
    tracing::info!("Attempt {} acquired {}", attempt.id, code);

    if !attempt.cancel.is_cancelled() {
        let _ = events
            .send(AppEvent::CodeDetected {
                attempt: attempt.id,
                code: code.clone(),
            })
            .await;
    }

    let outcome = cancellable(&attempt.cancel, async {
        verifier.verify(&code).await.map_err(AcquisitionError::from)
    })
    .await?;

    Ok(Verified { code, outcome })
}
