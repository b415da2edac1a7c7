//! In-process recognition with PaddleOCR models through `pure-onnx-ocr`.

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::Recognizer;
use crate::error::OcrError;
use crate::models::{PixelBox, WordRecord};

/// Engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
pub struct OnnxEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
    keep_unk: bool,
}

impl OnnxEngine {
    /// Load detection, recognition and dictionary files from `model_dir`.
    pub fn from_dir(model_dir: &Path, keep_unk: bool) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());
        Ok(Self { engine, keep_unk })
    }
}

impl Recognizer for OnnxEngine {
    fn name(&self) -> &str {
        "onnx"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<WordRecord>, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        let mut lines: Vec<(PixelBox, String, f32)> = results
            .iter()
            .map(|r| {
                let text = if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                (polygon_rect(&r.bounding_box), text, r.confidence)
            })
            .collect();

        // Reading order: 20 px row bands, then left to right.
        lines.sort_by(|(a, _, _), (b, _, _)| {
            let (row_a, row_b) = ((a.y / 20.0) as i64, (b.y / 20.0) as i64);
            row_a
                .cmp(&row_b)
                .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
        });

        let words: Vec<WordRecord> = lines
            .iter()
            .flat_map(|(rect, text, confidence)| split_line(rect, text, *confidence))
            .collect();

        debug!(
            "pure-onnx-ocr: {} lines, {} words on {}x{} in {}ms",
            lines.len(),
            words.len(),
            width,
            height,
            start.elapsed().as_millis()
        );
        Ok(words)
    }
}

/// Axis-aligned bounding rectangle of a detection polygon.
fn polygon_rect(polygon: &pure_onnx_ocr::Polygon<f64>) -> PixelBox {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        min_x = min_x.min(coord.x);
        min_y = min_y.min(coord.y);
        max_x = max_x.max(coord.x);
        max_y = max_y.max(coord.y);
    }
    if !min_x.is_finite() {
        return PixelBox::new(0.0, 0.0, 0.0, 0.0);
    }
    PixelBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Split a recognized line into words, dividing the line box by character
/// count. Separating spaces take one character slot each.
fn split_line(rect: &PixelBox, text: &str, confidence: f32) -> Vec<WordRecord> {
    let total_chars = text.chars().count();
    if total_chars == 0 {
        return Vec::new();
    }
    let char_width = rect.width / total_chars as f64;

    let mut words = Vec::new();
    let mut offset = 0usize;
    let mut current = String::new();
    let mut start = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(word_at(rect, char_width, start, &current, confidence));
                current.clear();
            }
            offset += 1;
            start = offset;
        } else {
            current.push(c);
            offset += 1;
        }
    }
    if !current.is_empty() {
        words.push(word_at(rect, char_width, start, &current, confidence));
    }
    words
}

fn word_at(rect: &PixelBox, char_width: f64, start: usize, text: &str, confidence: f32) -> WordRecord {
    let len = text.chars().count();
    WordRecord::new(
        text,
        PixelBox::new(
            rect.x + start as f64 * char_width,
            rect.y,
            len as f64 * char_width,
            rect.height,
        ),
        confidence,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_line_proportional() {
        let rect = PixelBox::new(100.0, 50.0, 110.0, 20.0);
        let words = split_line(&rect, "ab  cdefg", 0.8);

        // 9 character slots of 110/9 px.
        let slot = 110.0 / 9.0;
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "ab");
        assert_eq!(words[0].bbox.x, 100.0);
        assert!((words[0].bbox.width - 2.0 * slot).abs() < 1e-9);
        assert_eq!(words[1].text, "cdefg");
        assert!((words[1].bbox.x - (100.0 + 4.0 * slot)).abs() < 1e-9);
        assert_eq!(words[1].bbox.height, 20.0);
    }

    #[test]
    fn test_split_blank_line() {
        let rect = PixelBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(split_line(&rect, "   ", 0.5).is_empty());
        assert!(split_line(&rect, "", 0.5).is_empty());
    }
}
