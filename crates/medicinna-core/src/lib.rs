pub mod error;
pub mod extract;
pub mod preprocess;
pub mod progress;
pub mod recognition;

pub use error::{
    AcquisitionError, DecodeFailure, DetectionFailure, DeviceError, NetworkFailure, OcrFailure,
};
pub use extract::extract_batch_code;
pub use progress::ProgressReporter;
pub use recognition::{
    CameraSource, CameraStream, ObjectDetector, OpticalDecoder, TextRecognizer, Verifier,
};
