use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use medicinna_core::{OcrFailure, ProgressReporter, TextRecognizer};
use medicinna_types::OcrOutcome;
use tokio_util::sync::CancellationToken;

/// Runs a text recognizer under a cancellation token
#[derive(Clone)]
pub struct TextExtractionEngine {
    recognizer: Arc<dyn TextRecognizer>,
    language: String,
}

impl TextExtractionEngine {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, language: impl Into<String>) -> Self {
        Self {
            recognizer,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Recognize text in `image`.
    ///
    /// Cancelling `cancel` abandons the run; whatever the engine was doing is
    /// dropped and its result never reaches the caller.
    pub async fn recognize(
        &self,
        image: &DynamicImage,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<OcrOutcome, OcrFailure> {
        tracing::debug!(
            "Starting OCR ({}) on {}x{} image",
            self.language,
            image.width(),
            image.height()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("OCR run abandoned");
                Err(OcrFailure::Cancelled)
            }
            result = self.recognizer.recognize(image, &self.language, progress) => {
                let raw_text = result?;
                progress.report(100);
                tracing::debug!("OCR finished: {} chars", raw_text.len());
                Ok(OcrOutcome {
                    raw_text,
                    progress: progress.current(),
                })
            }
        }
    }
}

/// Stand-in when OCR is switched off or its engine could not be loaded
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextRecognizer for UnavailableRecognizer {
    async fn recognize(
        &self,
        _image: &DynamicImage,
        _language: &str,
        _progress: &ProgressReporter,
    ) -> Result<String, OcrFailure> {
        Err(OcrFailure::Engine(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    struct SlowRecognizer {
        text: &'static str,
        steps: u8,
    }

    #[async_trait]
    impl TextRecognizer for SlowRecognizer {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            _language: &str,
            progress: &ProgressReporter,
        ) -> Result<String, OcrFailure> {
            for step in 1..=self.steps {
                tokio::time::sleep(Duration::from_millis(20)).await;
                progress.report_fraction(step as f32 / (self.steps as f32 + 1.0));
            }
            Ok(self.text.to_string())
        }
    }

    #[tokio::test]
    async fn test_progress_ends_at_100() {
        let engine = TextExtractionEngine::new(
            Arc::new(SlowRecognizer {
                text: "LOT MED-2025-001",
                steps: 3,
            }),
            "eng",
        );
        let (progress, mut rx) = ProgressReporter::new();
        let cancel = CancellationToken::new();
        let image = DynamicImage::new_luma8(8, 8);

        let watcher = tokio::spawn(async move {
            let mut seen = vec![*rx.borrow()];
            while rx.changed().await.is_ok() {
                seen.push(*rx.borrow_and_update());
            }
            seen
        });

        let outcome = engine.recognize(&image, &cancel, &progress).await.unwrap();
        assert_eq!(outcome.raw_text, "LOT MED-2025-001");
        assert_eq!(outcome.progress, 100);
        drop(progress);

        let seen = timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {seen:?}");
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_cancel_abandons_run() {
        let engine = TextExtractionEngine::new(
            Arc::new(SlowRecognizer {
                text: "never",
                steps: 50,
            }),
            "eng",
        );
        let cancel = CancellationToken::new();
        let progress = ProgressReporter::detached();
        let image = DynamicImage::new_luma8(8, 8);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = timeout(
            Duration::from_secs(1),
            engine.recognize(&image, &cancel, &progress),
        )
        .await
        .unwrap();
        assert_eq!(result, Err(OcrFailure::Cancelled));
        assert!(progress.current() < 100);
    }

    #[tokio::test]
    async fn test_unavailable_engine_reports_error() {
        let engine =
            TextExtractionEngine::new(Arc::new(UnavailableRecognizer::new("OCR disabled")), "eng");
        let result = engine
            .recognize(
                &DynamicImage::new_luma8(4, 4),
                &CancellationToken::new(),
                &ProgressReporter::detached(),
            )
            .await;
        assert_eq!(result, Err(OcrFailure::Engine("OCR disabled".to_string())));
    }
}
