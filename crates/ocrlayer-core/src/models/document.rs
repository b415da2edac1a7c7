//! Loaded documents, their pages, and the per-page records passed between
//! pipeline stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use lopdf::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LoadError;
use crate::pdf;
use crate::validate;

/// Visible page size in PDF points, with the origin of the visible box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width_pt: f64,
    pub height_pt: f64,
}

impl PageGeometry {
    /// Build from a normalized `[x0, y0, x1, y1]` page box.
    pub fn from_box(page_box: [f64; 4]) -> Self {
        Self {
            origin_x: page_box[0],
            origin_y: page_box[1],
            width_pt: page_box[2] - page_box[0],
            height_pt: page_box[3] - page_box[1],
        }
    }
}

/// One page of a loaded document.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position in the document; defines output order.
    pub index: usize,
    /// The page dictionary in the source PDF. Never mutated.
    pub object_id: ObjectId,
    pub geometry: PageGeometry,
    /// Clockwise display rotation in degrees: 0, 90, 180 or 270.
    pub rotation: u16,
}

impl Page {
    /// 1-based page number for messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// An input PDF, immutable once loaded.
///
/// The parsed PDF is shared read-only between page workers.
#[derive(Debug, Clone)]
pub struct Document {
    source: PathBuf,
    raw: Arc<Vec<u8>>,
    pdf: Arc<lopdf::Document>,
    pages: Vec<Page>,
}

impl Document {
    /// Validate, read and parse the PDF at `path`.
    pub fn open(path: &Path, max_file_size_mb: u64) -> Result<Self, LoadError> {
        validate::validate_input(path, max_file_size_mb)?;

        let data = std::fs::read(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path, data)
    }

    /// Parse an in-memory PDF; `source` is only used for identification.
    pub fn from_bytes(source: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self, LoadError> {
        let source = source.into();
        let pdf = pdf::parse(&data)?;

        let pages = pdf
            .get_pages()
            .into_values()
            .enumerate()
            .map(|(index, object_id)| Page {
                index,
                object_id,
                geometry: PageGeometry::from_box(pdf::page_visible_box(&pdf, object_id)),
                rotation: pdf::page_rotation(&pdf, object_id),
            })
            .collect::<Vec<_>>();

        info!("Loaded {} ({} pages)", source.display(), pages.len());

        Ok(Self {
            source,
            raw: Arc::new(data),
            pdf: Arc::new(pdf),
            pages,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The original file bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// A shared handle to the original file bytes for worker tasks.
    pub fn shared_raw(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.raw)
    }

    pub fn pdf(&self) -> &lopdf::Document {
        &self.pdf
    }

    /// A shared handle to the parsed PDF for worker tasks.
    pub fn shared_pdf(&self) -> Arc<lopdf::Document> {
        Arc::clone(&self.pdf)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A page rendered to pixels, with the exact parameters used.
#[derive(Debug, Clone)]
pub struct RasterizedPage {
    pub image: DynamicImage,
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: u32,
    pub geometry: PageGeometry,
}

/// Axis-aligned box in pixel space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Axis-aligned box in PDF point space, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PointBox {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// A recognized word as reported by an OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub text: String,
    pub bbox: PixelBox,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl WordRecord {
    pub fn new(text: impl Into<String>, bbox: PixelBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
