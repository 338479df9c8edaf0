use unicode_normalization::UnicodeNormalization;

/// Prepare raw OCR output for pattern matching.
///
/// Folds compatibility glyphs (full-width letters and digits) to ASCII, blanks
/// everything that isn't an ASCII letter, digit, hyphen or whitespace, and
/// uppercases. Line structure is preserved.
pub fn normalize_ocr_text(text: &str) -> String {
    text.nfkc()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c.is_whitespace() {
                c.to_ascii_uppercase()
            } else {
                ' '
            }
        })
        .collect()
}

/// Keep only ASCII alphanumerics and hyphens
pub fn strip_to_code_chars(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_blanks_punctuation() {
        assert_eq!(normalize_ocr_text("Lot#: med-2025/001"), "LOT   MED-2025 001");
    }

    #[test]
    fn test_normalize_folds_fullwidth() {
        assert_eq!(normalize_ocr_text("ＭＥＤ－２０２５"), "MED-2025");
    }

    #[test]
    fn test_normalize_keeps_lines() {
        assert_eq!(normalize_ocr_text("a\nb"), "A\nB");
    }

    #[test]
    fn test_strip_to_code_chars() {
        assert_eq!(strip_to_code_chars("(B-77/X1)."), "B-77X1");
    }
}
