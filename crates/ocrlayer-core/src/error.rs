//! Error types for the ocrlayer-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the ocrlayer library.
///
/// `Load`, `Write` and `Config` are document-level and abort the whole run.
/// Page-scoped failures never surface here; they are recorded per page in the
/// run report instead.
#[derive(Error, Debug)]
pub enum OcrLayerError {
    /// The input document could not be loaded.
    #[error("failed to load input: {0}")]
    Load(#[from] LoadError),

    /// The output document could not be written.
    #[error("failed to write output: {0}")]
    Write(#[from] WriteError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// OCR engine error outside of a page pass (e.g. engine setup).
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// A page result could not be placed in the output document.
    #[error("output assembly error: {0}")]
    Assembly(#[from] crate::pipeline::SlotError),

    /// A document-level blocking task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Fatal errors raised while validating or parsing the input PDF.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Input path does not exist.
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    /// Input path does not carry a `.pdf` extension.
    #[error("input must be a PDF file, got extension {0:?}")]
    NotPdf(String),

    /// Input file is empty.
    #[error("input PDF is empty: {0}")]
    Empty(PathBuf),

    /// Input file exceeds the configured size limit.
    #[error("input file too large: {size_mb:.1} MB (limit {limit_mb} MB)")]
    TooLarge { size_mb: f64, limit_mb: u64 },

    /// Input could not be read.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the PDF structure.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Fatal errors raised while validating or writing the output PDF.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Output path does not carry a `.pdf` extension.
    #[error("output file must have a .pdf extension: {0}")]
    NotPdf(PathBuf),

    /// Output resolves to the input file.
    #[error("output would overwrite the input file: {0}")]
    SameAsInput(PathBuf),

    /// Output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing output file is read-only.
    #[error("output file is not writable: {0}")]
    ReadOnly(PathBuf),

    /// Serializing the PDF failed.
    #[error("failed to serialize PDF: {0}")]
    Serialize(String),

    /// Writing or renaming the output failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output was withheld because a page failed under the `abort` policy.
    #[error("{0} page(s) failed and the failure policy is abort")]
    Aborted(usize),
}

/// Page-scoped rasterization errors.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The renderer could not open or draw the page.
    #[error("render failed: {0}")]
    Render(String),

    /// The page geometry is unusable.
    #[error("invalid page geometry: {0}")]
    Geometry(String),

    /// Requested resolution is outside the supported range.
    #[error("unsupported DPI {0}")]
    Dpi(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine is missing or not runnable.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The engine produced output that could not be parsed.
    #[error("unexpected engine output: {0}")]
    Output(String),

    /// Invalid language code.
    #[error("invalid language code: {0}")]
    Language(String),
}

/// Result type for the ocrlayer library.
pub type Result<T> = std::result::Result<T, OcrLayerError>;
