//! Invisible text layer compositing.
//!
//! Each recognized word becomes a glyph run in text render mode 3 (no fill,
//! no stroke), positioned on the word's box and sized so the run's advance
//! matches the box width. The result is selectable and searchable text that
//! leaves the page's appearance untouched.

pub mod font;

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};
use tracing::{debug, trace};

use crate::geometry::map_box;
use crate::models::{PageGeometry, PointBox, WordRecord};

/// A word placed in page point space.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedWord {
    pub text: String,
    /// WinAnsi bytes written to the content stream.
    pub encoded: Vec<u8>,
    /// Box relative to the visible box origin.
    pub bbox: PointBox,
    pub font_size: f64,
    /// Horizontal scaling in percent (`Tz`); 100 unless the size was capped.
    pub horizontal_scale: f64,
}

/// The text layer of one page.
#[derive(Debug, Clone, Default)]
pub struct TextLayer {
    pub words: Vec<MappedWord>,
    /// Encoded content stream fragment; empty when there are no words.
    pub content: Vec<u8>,
}

impl TextLayer {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Options controlling which words end up in the layer.
#[derive(Debug, Clone, Copy)]
pub struct CompositorOptions {
    pub confidence_threshold: f32,
    pub dpi: u32,
}

/// Place a single word, or `None` if it is filtered out.
pub fn place_word(
    word: &WordRecord,
    geometry: &PageGeometry,
    options: &CompositorOptions,
) -> Option<MappedWord> {
    if word.confidence < options.confidence_threshold {
        trace!("Skipping '{}': confidence {:.2}", word.text, word.confidence);
        return None;
    }

    let text = word.text.trim();
    if text.is_empty() {
        return None;
    }

    let bbox = map_box(&word.bbox, geometry.width_pt, geometry.height_pt, options.dpi);
    let (box_w, box_h) = (bbox.width(), bbox.height());
    if box_w <= 0.0 || box_h <= 0.0 {
        trace!("Skipping '{}': degenerate box", text);
        return None;
    }

    let encoded = font::encode_win_ansi(text);
    let advance = font::advance_units(&encoded);

    let natural_size = box_w * 1000.0 / advance;
    let (font_size, horizontal_scale) = if natural_size > box_h {
        let scale = 100.0 * box_w / (advance * box_h / 1000.0);
        (box_h, scale)
    } else {
        (natural_size, 100.0)
    };

    Some(MappedWord {
        text: text.to_string(),
        encoded,
        bbox,
        font_size,
        horizontal_scale,
    })
}

/// Map and filter a page's words, keeping recognition order.
pub fn place_words(
    words: &[WordRecord],
    geometry: &PageGeometry,
    options: &CompositorOptions,
) -> Vec<MappedWord> {
    words
        .iter()
        .filter_map(|w| place_word(w, geometry, options))
        .collect()
}

/// Build the invisible text layer for a page.
///
/// `font_key` is the resource name under which the layer font is registered
/// on the page. Words keep their recognition order.
pub fn compose(
    words: &[WordRecord],
    geometry: &PageGeometry,
    options: &CompositorOptions,
    font_key: &str,
) -> Result<TextLayer, String> {
    render(place_words(words, geometry, options), geometry, font_key)
}

/// Encode already placed words as a text layer.
pub fn render(placed: Vec<MappedWord>, geometry: &PageGeometry, font_key: &str) -> Result<TextLayer, String> {
    if placed.is_empty() {
        return Ok(TextLayer::default());
    }

    let mut ops = Vec::with_capacity(placed.len() * 4 + 3);
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tr", vec![3.into()]));

    for word in &placed {
        let x = word.bbox.x0 + geometry.origin_x;
        let y = word.bbox.y0 + geometry.origin_y;

        ops.push(Operation::new(
            "Tf",
            vec![
                Object::Name(font_key.as_bytes().to_vec()),
                Object::Real(word.font_size as f32),
            ],
        ));
        ops.push(Operation::new(
            "Tz",
            vec![Object::Real(word.horizontal_scale as f32)],
        ));
        ops.push(Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                Object::Real(x as f32),
                Object::Real(y as f32),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(word.encoded.clone(), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));

    let content = Content { operations: ops }
        .encode()
        .map_err(|e| format!("failed to encode text layer: {}", e))?;

    debug!("Composed text layer with {} words", placed.len());
    Ok(TextLayer {
        words: placed,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PixelBox;
    use pretty_assertions::assert_eq;

    fn letter() -> PageGeometry {
        PageGeometry::from_box([0.0, 0.0, 612.0, 792.0])
    }

    fn options(threshold: f32) -> CompositorOptions {
        CompositorOptions {
            confidence_threshold: threshold,
            dpi: 72,
        }
    }

    fn word(text: &str, confidence: f32) -> WordRecord {
        WordRecord::new(text, PixelBox::new(100.0, 100.0, 60.0, 12.0), confidence)
    }

    fn decoded_ops(layer: &TextLayer) -> Vec<Operation> {
        Content::decode(&layer.content).unwrap().operations
    }

    #[test]
    fn test_confidence_filter() {
        let words = vec![word("alpha", 0.9), word("beta", 0.4), word("gamma", 0.95)];
        let layer = compose(&words, &letter(), &options(0.5), "F1").unwrap();

        let texts: Vec<&str> = layer.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "gamma"]);

        let shown: Vec<Vec<u8>> = decoded_ops(&layer)
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(bytes.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec![b"alpha".to_vec(), b"gamma".to_vec()]);
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let words = vec![word("a", 0.0), word("b", 0.01)];
        let layer = compose(&words, &letter(), &options(0.0), "F1").unwrap();
        assert_eq!(layer.words.len(), 2);
    }

    #[test]
    fn test_blank_and_degenerate_words_dropped() {
        let words = vec![
            word("   ", 1.0),
            WordRecord::new("flat", PixelBox::new(10.0, 10.0, 40.0, 0.0), 1.0),
        ];
        let layer = compose(&words, &letter(), &options(0.0), "F1").unwrap();
        assert!(layer.is_empty());
        assert!(layer.content.is_empty());
    }

    #[test]
    fn test_run_width_matches_box() {
        // A wide box: the natural size fits under the box height.
        let w = WordRecord::new("Hello", PixelBox::new(0.0, 0.0, 45.56, 40.0), 1.0);
        let placed = place_word(&w, &letter(), &options(0.0)).unwrap();

        let width = placed.font_size * font::advance_units(&placed.encoded) / 1000.0
            * placed.horizontal_scale
            / 100.0;
        assert!((width - 45.56).abs() < 1e-9);
        assert_eq!(placed.horizontal_scale, 100.0);
    }

    #[test]
    fn test_size_capped_at_box_height() {
        // "i" is narrow; its natural size would exceed the box height.
        let w = WordRecord::new("i", PixelBox::new(0.0, 0.0, 30.0, 10.0), 1.0);
        let placed = place_word(&w, &letter(), &options(0.0)).unwrap();

        assert_eq!(placed.font_size, 10.0);
        assert!(placed.horizontal_scale > 100.0);
        let width = placed.font_size * font::advance_units(&placed.encoded) / 1000.0
            * placed.horizontal_scale
            / 100.0;
        assert!((width - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_layer_is_invisible_and_positioned_at_baseline() {
        let layer = compose(&[word("alpha", 1.0)], &letter(), &options(0.0), "F1").unwrap();
        let ops = decoded_ops(&layer);

        assert_eq!(ops.first().map(|o| o.operator.as_str()), Some("BT"));
        assert_eq!(ops.last().map(|o| o.operator.as_str()), Some("ET"));

        let tr = ops.iter().find(|o| o.operator == "Tr").unwrap();
        assert!(matches!(tr.operands.as_slice(), [Object::Integer(3)]));

        // Pixel box bottom at 112 px on a 792 pt page at 72 dpi.
        let tm = ops.iter().find(|o| o.operator == "Tm").unwrap();
        assert_eq!(tm.operands[4].as_float().unwrap(), 100.0);
        assert_eq!(tm.operands[5].as_float().unwrap(), 680.0);
    }

    #[test]
    fn test_layer_translated_by_page_origin() {
        let geometry = PageGeometry::from_box([50.0, 60.0, 662.0, 852.0]);
        let layer = compose(&[word("alpha", 1.0)], &geometry, &options(0.0), "F1").unwrap();

        let ops = decoded_ops(&layer);
        let tm = ops.iter().find(|o| o.operator == "Tm").unwrap();
        assert_eq!(tm.operands[4].as_float().unwrap(), 150.0);
        assert_eq!(tm.operands[5].as_float().unwrap(), 740.0);
    }
}
