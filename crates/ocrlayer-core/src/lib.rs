//! Core library for making scanned PDFs searchable.
//!
//! This crate provides:
//! - PDF loading, validation and searchable-text detection
//! - Page rasterization through MuPDF
//! - Word recognition through tesseract or in-process ONNX models
//! - Invisible text layer generation aligned with the page image
//! - A concurrent page pipeline with per-page failure isolation

pub mod assemble;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod validate;

pub use detect::{AnalysisMethod, TextAnalysis};
pub use error::{LoadError, OcrError, OcrLayerError, RasterError, Result, WriteError};
pub use layer::{CompositorOptions, MappedWord, TextLayer};
pub use models::{
    Document, OcrLayerConfig, Page, PageFailurePolicy, PageGeometry, PixelBox, PointBox,
    RasterizedPage, WordRecord,
};
pub use ocr::{EngineFactory, EnginePool, Recognizer, TesseractEngine};
pub use pipeline::{
    CancelToken, FailureReason, PageFailure, PageReport, PageState, Pipeline, ProcessOutcome,
    ProcessingMethod, RunReport, RunStatus,
};
pub use raster::{MupdfRasterizer, Rasterizer};
