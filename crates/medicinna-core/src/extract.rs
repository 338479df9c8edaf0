use std::sync::LazyLock;

use medicinna_types::BatchCodeCandidate;
use regex::Regex;

use crate::preprocess::{normalize_ocr_text, strip_to_code_chars};

/// `LLL-DDDD-AAA` with optional hyphen/space separators, or a bare
/// alphanumeric run of at least 8 characters
const BATCH_PATTERN: &str = r"\b[A-Z]{3}[-\s]?\d{4}[-\s]?[A-Z0-9]{3}\b|\b[A-Z0-9]{8,}\b";

static BATCH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BATCH_PATTERN).expect("batch pattern is a valid regex"));

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is a valid regex"));

/// Line markers for the line-scan fallback
const LINE_MARKERS: [&str; 2] = ["BATCH", "LOT"];

/// Recover a batch code from raw OCR text.
///
/// The first pattern match in document order wins, even when a later match
/// looks more plausible.
pub fn extract_batch_code(raw_text: &str) -> Option<BatchCodeCandidate> {
    let cleaned = normalize_ocr_text(raw_text);

    if let Some(found) = BATCH_REGEX.find(&cleaned) {
        let code = WHITESPACE_REGEX.replace_all(found.as_str(), "-");
        tracing::debug!("Batch pattern matched: {}", code);
        return Some(BatchCodeCandidate::new(code));
    }

    let candidate = scan_marked_line(raw_text);
    if candidate.is_none() {
        tracing::debug!("No batch code in {} chars of OCR text", raw_text.len());
    }
    candidate
}

/// Look at the first line mentioning BATCH or LOT and take the last token
/// that looks like a code
fn scan_marked_line(raw_text: &str) -> Option<BatchCodeCandidate> {
    let line = raw_text.lines().find(|line| {
        let upper = line.to_uppercase();
        LINE_MARKERS.iter().any(|marker| upper.contains(marker))
    })?;

    let token = line
        .trim()
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|token| !token.is_empty())
        .rev()
        .find(|token| token.chars().count() > 3 && token.chars().any(|c| c.is_ascii_digit()))?;

    let code = strip_to_code_chars(token);
    tracing::debug!("Line scan picked '{}' from '{}'", code, line.trim());
    BatchCodeCandidate::from_input(&code)
}
