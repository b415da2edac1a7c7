//! Command-line options and the effective configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::debug;

use ocrlayer_core::models::{EngineKind, OcrLayerConfig, PageFailurePolicy};

/// Make scanned PDFs searchable by adding an invisible OCR text layer
#[derive(Parser, Debug)]
#[command(name = "ocrlayer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scanned input PDF
    #[arg(required_unless_present = "write_config")]
    pub input: Option<PathBuf>,

    /// Output PDF (created or overwritten)
    #[arg(required_unless_present = "write_config")]
    pub output: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    pub write_config: Option<PathBuf>,

    /// Rasterization resolution
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Pages processed in parallel (default: number of CPUs)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Minimum word confidence (0.0 - 1.0)
    #[arg(long)]
    pub confidence: Option<f32>,

    /// Per-page OCR timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// What to do when a page fails
    #[arg(long, value_enum)]
    pub on_page_failure: Option<FailurePolicyArg>,

    /// Run OCR even if the PDF already has searchable text
    #[arg(long)]
    pub force_ocr: bool,

    /// OCR language (tesseract code, e.g. "spa" or "eng+deu")
    #[arg(short, long)]
    pub language: Option<String>,

    /// OCR engine
    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    /// Path to the tesseract executable
    #[arg(long, value_name = "PATH")]
    pub tesseract_path: Option<String>,

    /// Directory with ONNX models (onnx engine)
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Maximum input size in megabytes
    #[arg(long, value_name = "MB")]
    pub max_file_size: Option<u64>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// No progress bar or summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FailurePolicyArg {
    /// Keep the failed page without a text layer
    Degrade,
    /// Write no output
    Abort,
}

impl From<FailurePolicyArg> for PageFailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::Degrade => PageFailurePolicy::Degrade,
            FailurePolicyArg::Abort => PageFailurePolicy::Abort,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EngineArg {
    /// The tesseract executable
    Tesseract,
    /// In-process ONNX models
    Onnx,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Tesseract => EngineKind::Tesseract,
            EngineArg::Onnx => EngineKind::Onnx,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocrlayer")
        .join("config.json")
}

/// Config file (explicit, then default location, then built-in defaults)
/// with command-line flags applied on top.
pub fn effective_config(cli: &Cli) -> anyhow::Result<OcrLayerConfig> {
    let mut config = match &cli.config {
        Some(path) => OcrLayerConfig::from_file(path).map_err(|e| {
            anyhow::anyhow!("cannot load config {}: {}", path.display(), e)
        })?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Using config file {}", path.display());
                OcrLayerConfig::from_file(&path).map_err(|e| {
                    anyhow::anyhow!("cannot load config {}: {}", path.display(), e)
                })?
            } else {
                OcrLayerConfig::default()
            }
        }
    };

    let pipeline = &mut config.pipeline;
    if let Some(dpi) = cli.dpi {
        pipeline.dpi = dpi;
    }
    if let Some(workers) = cli.workers {
        pipeline.worker_count = Some(workers);
    }
    if let Some(confidence) = cli.confidence {
        pipeline.confidence_threshold = confidence;
    }
    if let Some(timeout) = cli.timeout {
        pipeline.page_timeout_seconds = timeout;
    }
    if let Some(policy) = cli.on_page_failure {
        pipeline.on_page_failure = policy.into();
    }
    if cli.force_ocr {
        pipeline.force_ocr = true;
    }

    let ocr = &mut config.ocr;
    if let Some(language) = &cli.language {
        ocr.language = language.clone();
    }
    if let Some(engine) = cli.engine {
        ocr.engine = engine.into();
    }
    if let Some(path) = &cli.tesseract_path {
        ocr.tesseract_path = path.clone();
    }
    if let Some(dir) = &cli.model_dir {
        ocr.model_dir = dir.clone();
    }

    if let Some(limit) = cli.max_file_size {
        config.validation.max_file_size_mb = limit;
    }

    config.validate()?;
    Ok(config)
}

pub fn write_config(config: &OcrLayerConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;
    Ok(())
}
