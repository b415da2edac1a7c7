//! Data models for documents, pages and configuration.

pub mod config;
pub mod document;

pub use config::{
    DetectionConfig, EngineKind, OcrConfig, OcrLayerConfig, PageFailurePolicy, PipelineConfig,
    ValidationConfig,
};
pub use document::{Document, Page, PageGeometry, PixelBox, PointBox, RasterizedPage, WordRecord};
