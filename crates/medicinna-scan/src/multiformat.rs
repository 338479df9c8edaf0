use std::sync::Arc;

use image::DynamicImage;
use medicinna_core::{DecodeFailure, OpticalDecoder};

/// QR, Data Matrix and the common 1D symbologies through `rxing`
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiFormatDecoder;

impl OpticalDecoder for MultiFormatDecoder {
    fn decode(&self, image: &DynamicImage) -> Result<String, DecodeFailure> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeFailure::NotFound);
        }

        let result = rxing::helpers::detect_in_luma(gray.into_raw(), width, height, None)
            .map_err(|_| DecodeFailure::NotFound)?;
        tracing::trace!("rxing read {:?}", result.getBarcodeFormat());
        Ok(result.getText().to_string())
    }

    fn name(&self) -> &str {
        "multi-format"
    }
}

/// Tries each decoder in order; the first non-empty read wins
pub struct DecoderChain {
    decoders: Vec<Arc<dyn OpticalDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Arc<dyn OpticalDecoder>>) -> Self {
        Self { decoders }
    }
}

impl OpticalDecoder for DecoderChain {
    fn decode(&self, image: &DynamicImage) -> Result<String, DecodeFailure> {
        let mut last = DecodeFailure::NotFound;
        for decoder in &self.decoders {
            match decoder.decode(image) {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {}
                Err(e) => {
                    tracing::trace!("{}: {}", decoder.name(), e);
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use rxing::{BarcodeFormat, MultiFormatWriter, Writer};

    use super::*;
    use crate::Code128Decoder;
    use crate::code128::tests::render_text;

    const QUIET: u32 = 20;

    fn render(format: BarcodeFormat, text: &str, size: i32) -> DynamicImage {
        let matrix = MultiFormatWriter::default()
            .encode(text, &format, size, size)
            .unwrap();
        let (width, height) = (matrix.getWidth(), matrix.getHeight());
        let mut image = GrayImage::from_pixel(width + 2 * QUIET, height + 2 * QUIET, Luma([255]));
        for y in 0..height {
            for x in 0..width {
                if matrix.get(x, y) {
                    image.put_pixel(x + QUIET, y + QUIET, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(image)
    }

    #[test]
    fn test_reads_qr() {
        let image = render(BarcodeFormat::QR_CODE, "MED-2025-001", 200);
        assert_eq!(MultiFormatDecoder.decode(&image).unwrap(), "MED-2025-001");
    }

    #[test]
    fn test_reads_data_matrix() {
        let image = render(BarcodeFormat::DATA_MATRIX, "EXP-2023-999", 160);
        assert_eq!(MultiFormatDecoder.decode(&image).unwrap(), "EXP-2023-999");
    }

    #[test]
    fn test_blank_is_not_found() {
        let image = DynamicImage::new_luma8(64, 64);
        assert_eq!(MultiFormatDecoder.decode(&image), Err(DecodeFailure::NotFound));
    }

    #[test]
    fn test_chain_falls_through() {
        let chain = DecoderChain::new(vec![
            Arc::new(Code128Decoder::default()),
            Arc::new(MultiFormatDecoder),
        ]);

        let qr = render(BarcodeFormat::QR_CODE, "MED-2025-001", 200);
        assert_eq!(chain.decode(&qr).unwrap(), "MED-2025-001");

        let linear = render_text("REC-2025-BAD");
        assert_eq!(chain.decode(&linear).unwrap(), "REC-2025-BAD");

        assert!(chain.decode(&DynamicImage::new_luma8(32, 32)).is_err());
    }
}
