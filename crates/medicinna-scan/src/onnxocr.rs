use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use medicinna_config::ocr::OcrModelFiles;
use medicinna_core::{OcrFailure, ProgressReporter, TextRecognizer};
use oar_ocr::oarocr::{OAROCR, OAROCRBuilder};

/// Text detection and recognition with ONNX models through `oar-ocr`.
///
/// The recognized language is whatever the dictionary covers, so the
/// configured language is only logged.
pub struct OnnxTextRecognizer {
    ocr: Arc<OAROCR>,
}

impl OnnxTextRecognizer {
    /// Load the models. This opens ONNX sessions and takes a while.
    pub fn load(files: &OcrModelFiles) -> Result<Self, OcrFailure> {
        for path in [&files.detection, &files.recognition, &files.dictionary] {
            if !path.exists() {
                return Err(OcrFailure::Engine(format!(
                    "OCR model not found: {}",
                    path.display()
                )));
            }
        }

        let ocr = OAROCRBuilder::new(&files.detection, &files.recognition, &files.dictionary)
            .build()
            .map_err(|e| OcrFailure::Engine(format!("Failed to load OCR models: {e}")))?;
        tracing::info!("Loaded OCR models from {}", files.detection.display());

        Ok(Self { ocr: Arc::new(ocr) })
    }
}

#[async_trait]
impl TextRecognizer for OnnxTextRecognizer {
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        progress: &ProgressReporter,
    ) -> Result<String, OcrFailure> {
        tracing::trace!("ONNX OCR ignores language {}", language);
        let rgb = image.to_rgb8();
        progress.report(10);

        let ocr = self.ocr.clone();
        let lines = tokio::task::spawn_blocking(move || {
            ocr.predict(vec![rgb]).map(|results| {
                results
                    .into_iter()
                    .flat_map(|result| result.text_regions)
                    .filter_map(|region| region.text.map(|text| text.to_string()))
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| OcrFailure::Engine(format!("OCR task failed: {e}")))?
        .map_err(|e| OcrFailure::Engine(e.to_string()))?;
        progress.report(95);

        Ok(join_lines(lines))
    }
}

/// One line per recognized region, blanks dropped
fn join_lines(lines: Vec<String>) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_join_lines_skips_blanks() {
        let lines = vec![
            "Paracetamol 500mg".to_string(),
            "  ".to_string(),
            " LOT MED-2025-001 ".to_string(),
        ];
        assert_eq!(join_lines(lines), "Paracetamol 500mg\nLOT MED-2025-001");
    }

    #[test]
    fn test_missing_models_fail_to_load() {
        let files = OcrModelFiles {
            detection: PathBuf::from("/nonexistent/det.onnx"),
            recognition: PathBuf::from("/nonexistent/rec.onnx"),
            dictionary: PathBuf::from("/nonexistent/dict.txt"),
        };
        match OnnxTextRecognizer::load(&files) {
            Err(OcrFailure::Engine(message)) => assert!(message.contains("det.onnx")),
            _ => panic!("expected a load failure"),
        }
    }
}
