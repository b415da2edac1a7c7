//! Page rasterization through MuPDF.
//!
//! MuPDF contexts are not thread-safe, so every call opens its own document
//! from the shared input bytes and renders a single page. Pages are rendered
//! upright in unrotated page space so the resulting pixels line up with the
//! page's visible box.

use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix, Pixmap};
use tracing::{debug, trace};

use crate::error::RasterError;
use crate::geometry::{pixels_for, POINTS_PER_INCH};
use crate::models::config::{MAX_DPI, MIN_DPI};
use crate::models::{Page, RasterizedPage};

const PDF_MIME: &str = "application/pdf";

/// Pages above this many pixels are refused before anything is allocated.
pub const MAX_RASTER_PIXELS: u64 = 250_000_000;

/// Anything that can turn a page into pixels.
///
/// `pdf` holds the complete input file; `page` identifies the page in it.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf: &[u8], page: &Page, dpi: u32) -> Result<RasterizedPage, RasterError>;
}

/// Rasterizer backed by MuPDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfRasterizer;

impl MupdfRasterizer {
    pub fn new() -> Self {
        Self
    }
}

impl Rasterizer for MupdfRasterizer {
    fn rasterize(&self, pdf: &[u8], page: &Page, dpi: u32) -> Result<RasterizedPage, RasterError> {
        if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
            return Err(RasterError::Dpi(dpi));
        }

        let geometry = page.geometry;
        if geometry.width_pt <= 0.0 || geometry.height_pt <= 0.0 {
            return Err(RasterError::Geometry(format!(
                "page {} has an empty page box",
                page.number()
            )));
        }

        let expected_w = pixels_for(geometry.width_pt, dpi);
        let expected_h = pixels_for(geometry.height_pt, dpi);
        let pixels = expected_w as u64 * expected_h as u64;
        if pixels > MAX_RASTER_PIXELS {
            return Err(RasterError::Geometry(format!(
                "page {} would be {}x{} px at {} dpi, above the {} pixel limit",
                page.number(),
                expected_w,
                expected_h,
                dpi,
                MAX_RASTER_PIXELS
            )));
        }
        let index = i32::try_from(page.index)
            .map_err(|_| RasterError::Geometry(format!("page index {} out of range", page.index)))?;

        debug!(
            "Rasterizing page {} at {} dpi ({}x{} px)",
            page.number(),
            dpi,
            expected_w,
            expected_h
        );

        let doc = Document::from_bytes(pdf, PDF_MIME).map_err(render_error)?;
        let mupdf_page = doc.load_page(index).map_err(render_error)?;

        let scale = (dpi as f64 / POINTS_PER_INCH) as f32;
        let mut matrix = Matrix::new_scale(scale, scale);
        // MuPDF applies /Rotate itself; turning it back keeps pixel space aligned
        // with the unrotated page the text layer is written in.
        if page.rotation != 0 {
            matrix.concat(Matrix::new_rotate(-(page.rotation as f32)));
        }

        let pixmap = mupdf_page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
            .map_err(render_error)?;
        let image = pixmap_to_rgb(&pixmap)?;
        let (width_px, height_px) = image.dimensions();
        trace!("Page {}: pixmap {}x{} px", page.number(), width_px, height_px);

        if width_px.abs_diff(expected_w) > 1 || height_px.abs_diff(expected_h) > 1 {
            return Err(RasterError::Geometry(format!(
                "page {} rendered as {}x{} px, expected {}x{} px",
                page.number(),
                width_px,
                height_px,
                expected_w,
                expected_h
            )));
        }

        Ok(RasterizedPage {
            image: DynamicImage::ImageRgb8(image),
            width_px,
            height_px,
            dpi,
            geometry,
        })
    }
}

fn render_error(e: mupdf::Error) -> RasterError {
    RasterError::Render(e.to_string())
}

/// Copy an RGB pixmap into an image buffer, dropping any extra components.
fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<RgbImage, RasterError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let needed = width as usize * height as usize * n;
    if n < 3 || samples.len() < needed {
        return Err(RasterError::Render(format!(
            "pixmap has {} bytes for {}x{} px with {} components",
            samples.len(),
            width,
            height,
            n
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for px in samples[..needed].chunks_exact(n) {
        rgb.extend_from_slice(&px[..3]);
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| RasterError::Render("failed to create image buffer".to_string()))
}
