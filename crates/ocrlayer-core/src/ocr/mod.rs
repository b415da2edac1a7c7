//! OCR engines behind a common recognition interface.

mod pool;
mod tesseract;
#[cfg(feature = "onnx")]
mod onnx;

pub use pool::{EngineFactory, EnginePool, PoolStats, PooledEngine};
pub use tesseract::{validate_language, TesseractEngine};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use crate::error::OcrError;
use crate::models::{EngineKind, OcrConfig, OcrLayerConfig, WordRecord};

/// Word-level text recognition.
///
/// Implementations return words in reading order with pixel boxes relative to
/// the top-left corner of `image` and confidences in `[0, 1]`.
pub trait Recognizer: Send {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<WordRecord>, OcrError>;
}

/// Create a single engine of the configured kind.
///
/// Tesseract is checked first, so a missing binary or language pack fails here
/// rather than on every page.
///
/// `dpi` is the resolution pages will be rasterized at. Tesseract runs
/// longer than `time_limit` are killed.
pub fn create_recognizer(
    config: &OcrConfig,
    dpi: u32,
    time_limit: Duration,
) -> Result<Box<dyn Recognizer>, OcrError> {
    match config.engine {
        EngineKind::Tesseract => {
            let engine = TesseractEngine::new(config, dpi)?.with_time_limit(time_limit);
            let version = engine.version()?;
            debug!("Using {}", version);
            if !engine.language_installed()? {
                return Err(OcrError::Language(format!(
                    "language pack {:?} is not installed for {}",
                    config.language, config.tesseract_path
                )));
            }
            Ok(Box::new(engine))
        }
        #[cfg(feature = "onnx")]
        EngineKind::Onnx => Ok(Box::new(OnnxEngine::from_dir(&config.model_dir, config.keep_unk)?)),
        #[cfg(not(feature = "onnx"))]
        EngineKind::Onnx => Err(OcrError::Unavailable(
            "the onnx engine requires building with the `onnx` feature".to_string(),
        )),
    }
}

/// Factory creating engines of the configured kind, for use with [`EnginePool`].
pub fn engine_factory(config: &OcrLayerConfig) -> EngineFactory {
    let ocr = config.ocr.clone();
    let dpi = config.pipeline.dpi;
    let time_limit = config.pipeline.page_timeout();
    Arc::new(move || create_recognizer(&ocr, dpi, time_limit))
}
