use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use medicinna_core::{OcrFailure, ProgressReporter, TextRecognizer};
use windows::{
    Globalization::Language,
    Graphics::Imaging::BitmapDecoder,
    Media::Ocr::OcrEngine,
    Storage::Streams::{DataWriter, InMemoryRandomAccessStream},
    Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize},
    core::HSTRING,
};

/// Text recognition through `Windows.Media.Ocr`
pub struct WindowsTextRecognizer;

#[async_trait]
impl TextRecognizer for WindowsTextRecognizer {
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        progress: &ProgressReporter,
    ) -> Result<String, OcrFailure> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrFailure::Engine(format!("Failed to encode image: {e}")))?;
        progress.report(10);

        let tag = language_tag(language).to_string();
        let text = tokio::task::spawn_blocking(move || recognize_png(&png, &tag))
            .await
            .map_err(|e| OcrFailure::Engine(format!("OCR task failed: {e}")))?
            .map_err(|e| OcrFailure::Engine(e.to_string()))?;
        progress.report(95);

        Ok(text)
    }
}

/// Windows wants BCP-47 tags, OCR configs usually carry ISO 639-2 codes
fn language_tag(language: &str) -> &str {
    match language {
        "eng" => "en",
        "fra" => "fr",
        "deu" => "de",
        "spa" => "es",
        "jpn" => "ja",
        other => other,
    }
}

/// Keeps COM initialized for the lifetime of the blocking OCR call
struct Apartment;

impl Apartment {
    fn enter() -> windows::core::Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED).ok()? };
        Ok(Apartment)
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

fn recognize_png(bytes: &[u8], language_tag: &str) -> windows::core::Result<String> {
    let _apartment = Apartment::enter()?;

    let language = Language::CreateLanguage(&HSTRING::from(language_tag))?;
    let engine = OcrEngine::TryCreateFromLanguage(&language)?;

    let stream = InMemoryRandomAccessStream::new()?;
    let writer = DataWriter::CreateDataWriter(&stream)?;
    writer.WriteBytes(bytes)?;
    writer.StoreAsync()?.get()?;
    writer.FlushAsync()?.get()?;
    stream.Seek(0)?;

    let decoder = BitmapDecoder::CreateAsync(&stream)?.get()?;
    let bitmap = decoder.GetSoftwareBitmapAsync()?.get()?;

    let result = engine.RecognizeAsync(&bitmap)?.get()?;
    Ok(result.Text()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tag() {
        assert_eq!(language_tag("eng"), "en");
        assert_eq!(language_tag("ja"), "ja");
    }
}
