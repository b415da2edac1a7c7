//! Shared fixtures: synthetic PDFs and a scripted recognizer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use lopdf::{dictionary, Document, Object, Stream};

use ocrlayer_core::error::{OcrError, RasterError};
use ocrlayer_core::models::{OcrLayerConfig, Page, PixelBox, RasterizedPage, WordRecord};
use ocrlayer_core::ocr::{EngineFactory, Recognizer};
use ocrlayer_core::raster::{MupdfRasterizer, Rasterizer};

/// Gray level of page `index` in [`scanned_pdf`]; the recognizer reads it back.
pub fn page_gray(index: usize) -> u8 {
    50 * (index as u8 + 1)
}

/// How a synthetic page is painted.
#[derive(Debug, Clone, Copy)]
pub enum PageKind {
    /// A full-page uniform gray scan in an image XObject.
    Scan,
    /// The same scan as an inline image in the content stream.
    Inline,
}

/// A Letter-sized PDF with one full-page scan per page.
pub fn scanned_pdf(pages: usize) -> Vec<u8> {
    build_pdf(&vec![PageKind::Scan; pages])
}

pub fn build_pdf(kinds: &[PageKind]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for (index, kind) in kinds.iter().enumerate() {
        let samples = vec![page_gray(index); 64];
        let (content, resources) = match kind {
            PageKind::Scan => {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 8,
                        "Height" => 8,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    samples,
                ));
                (
                    b"q 612 0 0 792 0 0 cm /Im0 Do Q".to_vec(),
                    dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                )
            }
            PageKind::Inline => {
                let mut content = b"q 612 0 0 792 0 0 cm BI /W 8 /H 8 /CS /G /BPC 8 ID ".to_vec();
                content.extend_from_slice(&samples);
                content.extend_from_slice(b"\nEI Q");
                (content, dictionary! {})
            }
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(Object::Reference(page_id));
    }

    finish(doc, pages_id, kids)
}

/// A one-page PDF whose content is real text, well above the detection threshold.
pub fn text_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = b"BT /F1 12 Tf 72 720 Td \
        (The quick brown fox jumps over the lazy dog while the scanner keeps humming along) Tj \
        0 -14 Td (and every line on this page is already selectable and searchable text) Tj ET";
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });

    finish(doc, pages_id, vec![Object::Reference(page_id)])
}

fn finish(mut doc: Document, pages_id: lopdf::ObjectId, kids: Vec<Object>) -> Vec<u8> {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn write_pdf(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Renders every page with MuPDF except one, which fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingRasterizer {
    pub failing_index: usize,
}

impl Rasterizer for FailingRasterizer {
    fn rasterize(&self, pdf: &[u8], page: &Page, dpi: u32) -> Result<RasterizedPage, RasterError> {
        if page.index == self.failing_index {
            return Err(RasterError::Render("unreadable page image".to_string()));
        }
        MupdfRasterizer::new().rasterize(pdf, page, dpi)
    }
}

/// Recognizer that identifies the page by its gray level and returns a
/// fixed word list for it.
///
/// Each page yields `page<N>` (N is the 1-based page number) at confidence
/// 0.9 and `faint` at confidence 0.3. Clones share their call counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    delays: HashMap<usize, Duration>,
    silent: bool,
    panic_on: Option<usize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognizes nothing on any page.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Sleep before answering for the page at `index`.
    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Panic when asked to recognize the page at `index`.
    pub fn panicking_on(mut self, index: usize) -> Self {
        self.panic_on = Some(index);
        self
    }

    /// Most recognitions that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn factory(self) -> EngineFactory {
        Arc::new(move || -> Result<Box<dyn Recognizer>, OcrError> { Ok(Box::new(self.clone())) })
    }
}

/// Page index encoded in the image's center gray level.
pub fn page_index_of(image: &DynamicImage) -> usize {
    let luma = image.to_luma8();
    let value = luma.get_pixel(luma.width() / 2, luma.height() / 2)[0];
    ((value as f32 / 50.0).round() as usize).saturating_sub(1)
}

pub fn words_for(index: usize) -> Vec<WordRecord> {
    vec![
        WordRecord::new(
            format!("page{}", index + 1),
            PixelBox::new(72.0, 72.0, 144.0, 24.0),
            0.9,
        ),
        WordRecord::new("faint", PixelBox::new(72.0, 120.0, 60.0, 24.0), 0.3),
    ]
}

impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<WordRecord>, OcrError> {
        let index = page_index_of(image);
        if self.panic_on == Some(index) {
            panic!("scripted recognizer gave up on page {}", index + 1);
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&index) {
            std::thread::sleep(*delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.silent {
            return Ok(Vec::new());
        }
        Ok(words_for(index))
    }
}

/// Fast settings for tests: 72 dpi, one worker per page.
pub fn test_config(workers: usize) -> OcrLayerConfig {
    let mut config = OcrLayerConfig::default();
    config.pipeline.dpi = 72;
    config.pipeline.worker_count = Some(workers);
    config
}
