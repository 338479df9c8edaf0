mod camera;
mod code128;
mod detect;
#[cfg(feature = "live-camera")]
mod device;
mod frames;
mod multiformat;
#[cfg(all(not(windows), feature = "onnx-ocr"))]
mod onnxocr;
mod still;
mod text;
#[cfg(windows)]
mod winocr;

use std::sync::Arc;

use medicinna_config::ocr::OcrConfig;
use medicinna_core::{CameraSource, OpticalDecoder, TextRecognizer};

pub use camera::{CameraStreamDecoder, PendingScan, StreamHandle, scan_region};
pub use code128::Code128Decoder;
pub use detect::{CropRect, DetectAndCrop, Detection, crop_rect, crop_to_rect, select_best};
#[cfg(feature = "live-camera")]
pub use device::{DeviceCameraSource, pick_camera};
pub use frames::ImageSequenceSource;
pub use multiformat::{DecoderChain, MultiFormatDecoder};
#[cfg(all(not(windows), feature = "onnx-ocr"))]
pub use onnxocr::OnnxTextRecognizer;
pub use still::{StaticImageDecoder, load_image};
pub use text::{TextExtractionEngine, UnavailableRecognizer};
#[cfg(windows)]
pub use winocr::WindowsTextRecognizer;

/// Code 128 scanlines first, then every other format
pub fn default_decoder() -> Arc<dyn OpticalDecoder> {
    Arc::new(DecoderChain::new(vec![
        Arc::new(Code128Decoder::default()),
        Arc::new(MultiFormatDecoder),
    ]))
}

/// The platform OCR engine for `config`
pub fn default_text_recognizer(config: &OcrConfig) -> Arc<dyn TextRecognizer> {
    if !config.enabled {
        return Arc::new(UnavailableRecognizer::new("OCR is disabled"));
    }

    #[cfg(windows)]
    {
        Arc::new(WindowsTextRecognizer)
    }
    #[cfg(all(not(windows), feature = "onnx-ocr"))]
    {
        let Some(files) = config.model_files() else {
            tracing::warn!("No OCR model directory configured, uploads rely on optical decode");
            return Arc::new(UnavailableRecognizer::new("no OCR model directory configured"));
        };
        match OnnxTextRecognizer::load(&files) {
            Ok(recognizer) => Arc::new(recognizer),
            Err(e) => {
                tracing::error!("{}", e);
                Arc::new(UnavailableRecognizer::new(e.to_string()))
            }
        }
    }
    #[cfg(all(not(windows), not(feature = "onnx-ocr")))]
    {
        Arc::new(UnavailableRecognizer::new("built without an OCR engine"))
    }
}

/// The machine's cameras, or nothing in builds without camera support
pub fn default_camera_source() -> Arc<dyn CameraSource> {
    #[cfg(feature = "live-camera")]
    {
        Arc::new(DeviceCameraSource)
    }
    #[cfg(not(feature = "live-camera"))]
    {
        tracing::warn!("Built without camera support");
        Arc::new(ImageSequenceSource::new(Vec::new()))
    }
}
