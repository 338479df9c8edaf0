use std::sync::Arc;

use image::DynamicImage;
use medicinna_core::{DecodeFailure, OpticalDecoder};
use medicinna_types::RecognitionResult;

/// Decode an uploaded file
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage, DecodeFailure> {
    image::load_from_memory(bytes).map_err(|e| DecodeFailure::InvalidImage(e.to_string()))
}

/// One-shot optical decode of a still image. Retrying is up to the caller.
#[derive(Clone)]
pub struct StaticImageDecoder {
    decoder: Arc<dyn OpticalDecoder>,
}

impl StaticImageDecoder {
    pub fn new(decoder: Arc<dyn OpticalDecoder>) -> Self {
        Self { decoder }
    }

    pub fn decode(&self, image: &DynamicImage) -> RecognitionResult {
        match self.decoder.decode(image) {
            Ok(text) if !text.trim().is_empty() => {
                RecognitionResult::DecodedText(text.trim().to_string())
            }
            Ok(_) => RecognitionResult::NoMatch,
            Err(e) => {
                tracing::debug!(
                    "{} found nothing in {}x{} image: {}",
                    self.decoder.name(),
                    image.width(),
                    image.height(),
                    e
                );
                RecognitionResult::NoMatch
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code128::tests::render_text;
    use crate::Code128Decoder;

    fn decoder() -> StaticImageDecoder {
        StaticImageDecoder::new(Arc::new(Code128Decoder::default()))
    }

    #[test]
    fn test_decode_is_deterministic() {
        let image = render_text("EXP-2023-999");
        let first = decoder().decode(&image);
        assert_eq!(first, RecognitionResult::DecodedText("EXP-2023-999".to_string()));
        assert_eq!(decoder().decode(&image), first);
    }

    #[test]
    fn test_no_code_is_no_match() {
        let image = DynamicImage::new_luma8(64, 64);
        assert_eq!(decoder().decode(&image), RecognitionResult::NoMatch);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        assert!(matches!(
            load_image(b"not an image"),
            Err(DecodeFailure::InvalidImage(_))
        ));
    }
}
