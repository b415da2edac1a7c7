//! Configuration structures for the text-layer pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::OcrLayerError;

/// Lowest accepted rasterization resolution.
pub const MIN_DPI: u32 = 72;

/// Highest accepted rasterization resolution.
pub const MAX_DPI: u32 = 600;

/// Below this resolution recognition of body text gets unreliable.
pub const RECOMMENDED_MIN_DPI: u32 = 150;

/// Main configuration for ocrlayer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrLayerConfig {
    /// Page pipeline configuration.
    pub pipeline: PipelineConfig,

    /// OCR engine configuration.
    pub ocr: OcrConfig,

    /// Searchable-text detection configuration.
    pub detection: DetectionConfig,

    /// Input validation configuration.
    pub validation: ValidationConfig,
}

/// What to do with a page whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFailurePolicy {
    /// Emit the page with its original content only.
    #[default]
    Degrade,
    /// Write no output at all.
    Abort,
}

/// Page pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// DPI for rendering PDF pages to images.
    pub dpi: u32,

    /// Number of pages processed in parallel (`None` = available parallelism).
    pub worker_count: Option<usize>,

    /// Minimum word confidence (0.0 - 1.0) for embedding a word.
    pub confidence_threshold: f32,

    /// Per-page recognition deadline in seconds.
    pub page_timeout_seconds: f64,

    /// Behavior when a page fails.
    pub on_page_failure: PageFailurePolicy,

    /// Run OCR even if the PDF already contains searchable text.
    pub force_ocr: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            worker_count: None,
            confidence_threshold: 0.0,
            page_timeout_seconds: 30.0,
            on_page_failure: PageFailurePolicy::Degrade,
            force_ocr: false,
        }
    }
}

impl PipelineConfig {
    /// Effective worker count, falling back to the number of CPUs.
    pub fn workers(&self) -> usize {
        self.worker_count
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    /// Per-page timeout as a `Duration`.
    ///
    /// Values that do not fit a `Duration` saturate; `validate` rejects them.
    pub fn page_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.page_timeout_seconds).unwrap_or(Duration::MAX)
    }
}

/// Which recognition backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// The `tesseract` executable.
    #[default]
    Tesseract,
    /// PaddleOCR ONNX models run in-process (requires the `onnx` feature).
    Onnx,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Recognition backend.
    pub engine: EngineKind,

    /// Recognition language (tesseract code, e.g. "spa", "eng+deu").
    pub language: String,

    /// Path to the tesseract executable.
    pub tesseract_path: String,

    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,

    /// Replace `[UNK]` tokens produced by the ONNX recognizer.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Tesseract,
            language: "spa".to_string(),
            tesseract_path: "tesseract".to_string(),
            model_dir: PathBuf::from("models"),
            keep_unk: false,
        }
    }
}

/// Searchable-text detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum characters on a page for it to count as having text.
    pub min_text_chars: usize,

    /// Minimum fraction of pages with text for the document to be searchable.
    pub min_text_page_ratio: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            min_text_page_ratio: 0.1,
        }
    }
}

/// Input validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum input size in megabytes.
    pub max_file_size_mb: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
        }
    }
}

impl OcrLayerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), OcrLayerError> {
        let p = &self.pipeline;

        if !(MIN_DPI..=MAX_DPI).contains(&p.dpi) {
            return Err(OcrLayerError::Config(format!(
                "dpi must be between {} and {}, got {}",
                MIN_DPI, MAX_DPI, p.dpi
            )));
        }
        if p.dpi < RECOMMENDED_MIN_DPI {
            tracing::warn!(
                "dpi {} is below {}; recognition quality may suffer",
                p.dpi,
                RECOMMENDED_MIN_DPI
            );
        }
        if !(0.0..=1.0).contains(&p.confidence_threshold) {
            return Err(OcrLayerError::Config(format!(
                "confidence_threshold must be within 0..=1, got {}",
                p.confidence_threshold
            )));
        }
        if !p.page_timeout_seconds.is_finite() || p.page_timeout_seconds <= 0.0 {
            return Err(OcrLayerError::Config(format!(
                "page_timeout_seconds must be positive, got {}",
                p.page_timeout_seconds
            )));
        }
        if let Err(e) = Duration::try_from_secs_f64(p.page_timeout_seconds) {
            return Err(OcrLayerError::Config(format!(
                "page_timeout_seconds {} is out of range: {}",
                p.page_timeout_seconds, e
            )));
        }
        if p.worker_count == Some(0) {
            return Err(OcrLayerError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.min_text_page_ratio) {
            return Err(OcrLayerError::Config(format!(
                "min_text_page_ratio must be within 0..=1, got {}",
                self.detection.min_text_page_ratio
            )));
        }

        Ok(())
    }
}
