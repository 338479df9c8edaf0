use thiserror::Error;

/// Camera permission or hardware problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("No camera matching the requested facing mode")]
    NotFound,

    #[error("Camera is in use by another application")]
    Busy,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionFailure {
    #[error("no boxes")]
    NoBoxes,

    #[error("detection box does not overlap the image")]
    EmptyCrop,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("detection service error: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("no optical code found")]
    NotFound,

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcrFailure {
    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("no batch code in recognized text")]
    NoCandidate,

    #[error("OCR cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("not authorized")]
    Unauthorized,

    #[error("invalid response: {0}")]
    Parse(String),
}

/// Terminal failure of one acquisition attempt.
///
/// `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("Please enter a batch code.")]
    EmptyInput,

    #[error("Camera Error: {0}")]
    Device(#[from] DeviceError),

    #[error("Could not detect a valid Batch ID. Please ensure the image is clear or try manual entry.")]
    NoBatchCode,

    #[error("Failed to process image. Please try again or use manual entry.")]
    Ocr(OcrFailure),

    #[error("AI Scan found no objects in the photo. Please try a clearer photo.")]
    NothingDetected,

    #[error("AI detected objects but could not read the barcode text. Please try a clearer photo.")]
    Unreadable,

    #[error("AI Scan failed: {0}")]
    Detection(DetectionFailure),

    #[error("Verification failed. Please try again.")]
    Network(#[from] NetworkFailure),

    #[error("Scan cancelled.")]
    Cancelled,
}

impl From<OcrFailure> for AcquisitionError {
    fn from(failure: OcrFailure) -> Self {
        match failure {
            OcrFailure::NoCandidate => AcquisitionError::NoBatchCode,
            OcrFailure::Cancelled => AcquisitionError::Cancelled,
            other => AcquisitionError::Ocr(other),
        }
    }
}

impl From<DetectionFailure> for AcquisitionError {
    fn from(failure: DetectionFailure) -> Self {
        match failure {
            DetectionFailure::NoBoxes => AcquisitionError::NothingDetected,
            // A box was found, it just didn't land on the image
            DetectionFailure::EmptyCrop => AcquisitionError::Unreadable,
            other => AcquisitionError::Detection(other),
        }
    }
}

impl AcquisitionError {
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_messages_are_distinct() {
        let none = AcquisitionError::from(DetectionFailure::NoBoxes).user_message();
        let unreadable = AcquisitionError::Unreadable.user_message();
        assert_ne!(none, unreadable);
        assert!(none.contains("no objects"));
        assert!(unreadable.contains("could not read"));
    }

    #[test]
    fn test_ocr_no_candidate_recommends_manual_entry() {
        let err = AcquisitionError::from(OcrFailure::NoCandidate);
        assert_eq!(err, AcquisitionError::NoBatchCode);
        assert!(err.user_message().contains("manual entry"));
    }

    #[test]
    fn test_device_error_message() {
        let err = AcquisitionError::from(DeviceError::PermissionDenied);
        assert_eq!(err.user_message(), "Camera Error: Permission denied");
    }
}
