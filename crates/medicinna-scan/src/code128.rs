//! Code 128 scanline decoder.
//!
//! Samples a handful of horizontal rows, binarizes each one, and matches the
//! bar/space run widths against the symbol table. Rows are tried middle-out and
//! in both directions, so an upside-down label still reads.

use image::{DynamicImage, GrayImage};
use medicinna_core::{DecodeFailure, OpticalDecoder};

/// Bar/space widths, in modules, for symbol values 0..=105.
/// Index 106 holds the first six elements of the stop pattern.
const PATTERNS: [[u8; 6]; 107] = [
    [2, 1, 2, 2, 2, 2], [2, 2, 2, 1, 2, 2], [2, 2, 2, 2, 2, 1], [1, 2, 1, 2, 2, 3],
    [1, 2, 1, 3, 2, 2], [1, 3, 1, 2, 2, 2], [1, 2, 2, 2, 1, 3], [1, 2, 2, 3, 1, 2],
    [1, 3, 2, 2, 1, 2], [2, 2, 1, 2, 1, 3], [2, 2, 1, 3, 1, 2], [2, 3, 1, 2, 1, 2],
    [1, 1, 2, 2, 3, 2], [1, 2, 2, 1, 3, 2], [1, 2, 2, 2, 3, 1], [1, 1, 3, 2, 2, 2],
    [1, 2, 3, 1, 2, 2], [1, 2, 3, 2, 2, 1], [2, 2, 3, 2, 1, 1], [2, 2, 1, 1, 3, 2],
    [2, 2, 1, 2, 3, 1], [2, 1, 3, 2, 1, 2], [2, 2, 3, 1, 1, 2], [3, 1, 2, 1, 3, 1],
    [3, 1, 1, 2, 2, 2], [3, 2, 1, 1, 2, 2], [3, 2, 1, 2, 2, 1], [3, 1, 2, 2, 1, 2],
    [3, 2, 2, 1, 1, 2], [3, 2, 2, 2, 1, 1], [2, 1, 2, 1, 2, 3], [2, 1, 2, 3, 2, 1],
    [2, 3, 2, 1, 2, 1], [1, 1, 1, 3, 2, 3], [1, 3, 1, 1, 2, 3], [1, 3, 1, 3, 2, 1],
    [1, 1, 2, 3, 1, 3], [1, 3, 2, 1, 1, 3], [1, 3, 2, 3, 1, 1], [2, 1, 1, 3, 1, 3],
    [2, 3, 1, 1, 1, 3], [2, 3, 1, 3, 1, 1], [1, 1, 2, 1, 3, 3], [1, 1, 2, 3, 3, 1],
    [1, 3, 2, 1, 3, 1], [1, 1, 3, 1, 2, 3], [1, 1, 3, 3, 2, 1], [1, 3, 3, 1, 2, 1],
    [3, 1, 3, 1, 2, 1], [2, 1, 1, 3, 3, 1], [2, 3, 1, 1, 3, 1], [2, 1, 3, 1, 1, 3],
    [2, 1, 3, 3, 1, 1], [2, 1, 3, 1, 3, 1], [3, 1, 1, 1, 2, 3], [3, 1, 1, 3, 2, 1],
    [3, 3, 1, 1, 2, 1], [3, 1, 2, 1, 1, 3], [3, 1, 2, 3, 1, 1], [3, 3, 2, 1, 1, 1],
    [3, 1, 4, 1, 1, 1], [2, 2, 1, 4, 1, 1], [4, 3, 1, 1, 1, 1], [1, 1, 1, 2, 2, 4],
    [1, 1, 1, 4, 2, 2], [1, 2, 1, 1, 2, 4], [1, 2, 1, 4, 2, 1], [1, 4, 1, 1, 2, 2],
    [1, 4, 1, 2, 2, 1], [1, 1, 2, 2, 1, 4], [1, 1, 2, 4, 1, 2], [1, 2, 2, 1, 1, 4],
    [1, 2, 2, 4, 1, 1], [1, 4, 2, 1, 1, 2], [1, 4, 2, 2, 1, 1], [2, 4, 1, 2, 1, 1],
    [2, 2, 1, 1, 1, 4], [4, 1, 3, 1, 1, 1], [2, 4, 1, 1, 1, 2], [1, 3, 4, 1, 1, 1],
    [1, 1, 1, 2, 4, 2], [1, 2, 1, 1, 4, 2], [1, 2, 1, 2, 4, 1], [1, 1, 4, 2, 1, 2],
    [1, 2, 4, 1, 1, 2], [1, 2, 4, 2, 1, 1], [4, 1, 1, 2, 1, 2], [4, 2, 1, 1, 1, 2],
    [4, 2, 1, 2, 1, 1], [2, 1, 2, 1, 4, 1], [2, 1, 4, 1, 2, 1], [4, 1, 2, 1, 2, 1],
    [1, 1, 1, 1, 4, 3], [1, 1, 1, 3, 4, 1], [1, 3, 1, 1, 4, 1], [1, 1, 4, 1, 1, 3],
    [1, 1, 4, 3, 1, 1], [4, 1, 1, 1, 1, 3], [4, 1, 1, 3, 1, 1], [1, 1, 3, 1, 4, 1],
    [1, 1, 4, 1, 3, 1], [3, 1, 1, 1, 4, 1], [4, 1, 1, 1, 3, 1], [2, 1, 1, 4, 1, 2],
    [2, 1, 1, 2, 1, 4], [2, 1, 1, 2, 3, 2], [2, 3, 3, 1, 1, 1],
];

const START_A: usize = 103;
const START_B: usize = 104;
const START_C: usize = 105;
const STOP: usize = 106;

/// Summed per-element deviation, in modules, above which a run group is
/// rejected
const MAX_SYMBOL_ERROR: f32 = 1.6;

/// Rows with less luma spread than this have no bars worth reading
const MIN_CONTRAST: u8 = 32;

#[derive(Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    A,
    B,
    C,
}

pub struct Code128Decoder {
    rows: u32,
}

impl Code128Decoder {
    pub fn new(rows: u32) -> Self {
        Self { rows: rows.max(1) }
    }
}

impl Default for Code128Decoder {
    fn default() -> Self {
        Self::new(9)
    }
}

impl OpticalDecoder for Code128Decoder {
    fn decode(&self, image: &DynamicImage) -> Result<String, DecodeFailure> {
        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Err(DecodeFailure::InvalidImage("empty image".to_string()));
        }

        for y in scan_rows(gray.height(), self.rows) {
            let row = sample_row(&gray, y);
            if let Some(text) = decode_row(&row) {
                tracing::debug!("Code 128 decoded on row {}: {}", y, text);
                return Ok(text);
            }
        }

        Err(DecodeFailure::NotFound)
    }

    fn name(&self) -> &str {
        "code128"
    }
}

/// Evenly spaced rows, nearest to the middle first
fn scan_rows(height: u32, rows: u32) -> Vec<u32> {
    let mut ys: Vec<u32> = (1..=rows)
        .map(|k| (height as u64 * k as u64 / (rows as u64 + 1)) as u32)
        .collect();
    let middle = height / 2;
    ys.sort_by_key(|y| y.abs_diff(middle));
    ys.dedup();
    ys
}

fn sample_row(gray: &GrayImage, y: u32) -> Vec<u8> {
    (0..gray.width()).map(|x| gray.get_pixel(x, y)[0]).collect()
}

fn decode_row(row: &[u8]) -> Option<String> {
    let runs = bar_runs(row)?;
    decode_runs(&runs).or_else(|| {
        let reversed: Vec<u32> = runs.iter().rev().copied().collect();
        decode_runs(&reversed)
    })
}

/// Run lengths of alternating dark/light pixels, starting and ending on a
/// dark run
fn bar_runs(row: &[u8]) -> Option<Vec<u32>> {
    let min = *row.iter().min()?;
    let max = *row.iter().max()?;
    if max - min < MIN_CONTRAST {
        return None;
    }
    let threshold = min + (max - min) / 2;

    let mut runs = Vec::new();
    let mut current_dark = None;
    let mut length = 0u32;

    for &luma in row {
        let dark = luma < threshold;
        match current_dark {
            Some(prev) if prev == dark => length += 1,
            Some(prev) => {
                runs.push((prev, length));
                current_dark = Some(dark);
                length = 1;
            }
            None => {
                current_dark = Some(dark);
                length = 1;
            }
        }
    }
    if let Some(dark) = current_dark {
        runs.push((dark, length));
    }

    // Quiet zones
    while runs.first().is_some_and(|(dark, _)| !dark) {
        runs.remove(0);
    }
    while runs.last().is_some_and(|(dark, _)| !dark) {
        runs.pop();
    }

    if runs.len() < 6 {
        return None;
    }
    Some(runs.into_iter().map(|(_, len)| len).collect())
}

/// Closest symbol for six run widths, if close enough
fn match_symbol(widths: &[u32]) -> Option<usize> {
    let total: u32 = widths.iter().sum();
    if total == 0 {
        return None;
    }
    let module = total as f32 / 11.0;

    let (best, error) = PATTERNS
        .iter()
        .enumerate()
        .map(|(value, pattern)| {
            let error: f32 = widths
                .iter()
                .zip(pattern)
                .map(|(&w, &p)| (w as f32 / module - p as f32).abs())
                .sum();
            (value, error)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    (error <= MAX_SYMBOL_ERROR).then_some(best)
}

fn decode_runs(runs: &[u32]) -> Option<String> {
    // Symbols start on dark runs, which sit at even indices
    (0..runs.len().saturating_sub(5))
        .step_by(2)
        .filter(|&start| {
            matches!(
                match_symbol(&runs[start..start + 6]),
                Some(START_A | START_B | START_C)
            )
        })
        .find_map(|start| decode_from(runs, start))
}

fn decode_from(runs: &[u32], start: usize) -> Option<String> {
    let start_value = match_symbol(&runs[start..start + 6])?;
    let mut values = Vec::new();
    let mut pos = start + 6;

    loop {
        if pos + 6 > runs.len() {
            return None;
        }
        let symbol = match_symbol(&runs[pos..pos + 6])?;
        if symbol == STOP {
            break;
        }
        if symbol >= START_A {
            return None;
        }
        values.push(symbol);
        pos += 6;
    }

    // Terminating bar of the stop pattern
    if pos + 6 >= runs.len() {
        return None;
    }

    let (&check, data) = values.split_last()?;
    if data.is_empty() {
        return None;
    }

    let weighted: usize = data
        .iter()
        .enumerate()
        .map(|(i, &value)| (i + 1) * value)
        .sum();
    if (start_value + weighted) % 103 != check {
        tracing::trace!("Code 128 checksum mismatch");
        return None;
    }

    decode_values(start_value, data)
}

fn decode_values(start_value: usize, data: &[usize]) -> Option<String> {
    let mut set = match start_value {
        START_A => CodeSet::A,
        START_B => CodeSet::B,
        _ => CodeSet::C,
    };
    let mut shifted = false;
    let mut out = String::new();

    for &value in data {
        let active = match (shifted, set) {
            (true, CodeSet::A) => CodeSet::B,
            (true, CodeSet::B) => CodeSet::A,
            _ => set,
        };
        shifted = false;

        match active {
            CodeSet::C => match value {
                0..=99 => out.push_str(&format!("{value:02}")),
                100 => set = CodeSet::B,
                101 => set = CodeSet::A,
                102 => {}
                _ => return None,
            },
            CodeSet::A => match value {
                0..=63 => out.push(char::from(value as u8 + 32)),
                64..=95 => out.push(char::from(value as u8 - 64)),
                98 => shifted = true,
                99 => set = CodeSet::C,
                100 => set = CodeSet::B,
                // FNC1-4
                96 | 97 | 101 | 102 => {}
                _ => return None,
            },
            CodeSet::B => match value {
                0..=95 => out.push(char::from(value as u8 + 32)),
                98 => shifted = true,
                99 => set = CodeSet::C,
                101 => set = CodeSet::A,
                96 | 97 | 100 | 102 => {}
                _ => return None,
            },
        }
    }

    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{ImageBuffer, Luma};

    use super::*;

    /// Symbol values for `text` in code set B, with start and checksum
    fn values_b(text: &str) -> Vec<usize> {
        let mut values = vec![START_B];
        values.extend(text.bytes().map(|b| (b - 32) as usize));
        let weighted: usize = values[1..]
            .iter()
            .enumerate()
            .map(|(i, &v)| (i + 1) * v)
            .sum();
        values.push((START_B + weighted) % 103);
        values
    }

    pub(crate) fn render(values: &[usize], module: u32, height: u32) -> GrayImage {
        let mut widths: Vec<u32> = Vec::new();
        for &value in values {
            widths.extend(PATTERNS[value].iter().map(|&w| w as u32));
        }
        widths.extend(PATTERNS[STOP].iter().map(|&w| w as u32));
        widths.push(2);

        let quiet = 10;
        let modules: u32 = widths.iter().sum::<u32>() + 2 * quiet;
        let mut image: GrayImage = ImageBuffer::from_pixel(modules * module, height, Luma([255]));

        let mut x = quiet * module;
        for (i, &w) in widths.iter().enumerate() {
            let span = w * module;
            if i % 2 == 0 {
                for dx in 0..span {
                    for y in 0..height {
                        image.put_pixel(x + dx, y, Luma([0]));
                    }
                }
            }
            x += span;
        }
        image
    }

    pub(crate) fn render_text(text: &str) -> DynamicImage {
        DynamicImage::ImageLuma8(render(&values_b(text), 2, 40))
    }

    #[test]
    fn test_decodes_code_set_b() {
        let decoder = Code128Decoder::default();
        assert_eq!(
            decoder.decode(&render_text("MED-2025-001")).unwrap(),
            "MED-2025-001"
        );
    }

    #[test]
    fn test_decodes_code_set_c() {
        // 12 34 56 78
        let data = [12usize, 34, 56, 78];
        let weighted: usize = data.iter().enumerate().map(|(i, &v)| (i + 1) * v).sum();
        let mut values = vec![START_C];
        values.extend(data);
        values.push((START_C + weighted) % 103);

        let image = DynamicImage::ImageLuma8(render(&values, 3, 30));
        assert_eq!(Code128Decoder::default().decode(&image).unwrap(), "12345678");
    }

    #[test]
    fn test_decodes_upside_down() {
        let image = render_text("LOW-2025-PUR").fliph();
        assert_eq!(
            Code128Decoder::default().decode(&image).unwrap(),
            "LOW-2025-PUR"
        );
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let mut values = values_b("FAKE-123");
        if let Some(check) = values.last_mut() {
            *check = (*check + 1) % 103;
        }
        let image = DynamicImage::ImageLuma8(render(&values, 2, 20));
        assert_eq!(
            Code128Decoder::default().decode(&image),
            Err(DecodeFailure::NotFound)
        );
    }

    #[test]
    fn test_blank_image_has_no_code() {
        let image = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(120, 40, Luma([255])));
        assert_eq!(
            Code128Decoder::default().decode(&image),
            Err(DecodeFailure::NotFound)
        );
    }

    #[test]
    fn test_scan_rows_start_in_the_middle() {
        let rows = scan_rows(100, 3);
        assert_eq!(rows, vec![50, 25, 75]);
    }
}
