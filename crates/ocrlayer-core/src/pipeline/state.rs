//! Per-page states, failure reasons and the run report.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::TextAnalysis;

/// Where a page is in its processing.
///
/// Pages move `Pending → Rasterizing → Recognizing → Mapping → Compositing →
/// Assembled`, or to `Failed` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Rasterizing,
    Recognizing,
    Mapping,
    Compositing,
    Assembled,
    Failed,
}

impl PageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Assembled | PageState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PageState) -> bool {
        use PageState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Rasterizing)
            | (Rasterizing, Recognizing)
            | (Recognizing, Mapping)
            | (Mapping, Compositing)
            | (Compositing, Assembled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageState::Pending => "pending",
            PageState::Rasterizing => "rasterizing",
            PageState::Recognizing => "recognizing",
            PageState::Mapping => "mapping",
            PageState::Compositing => "compositing",
            PageState::Assembled => "assembled",
            PageState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a page failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("rasterization failed: {0}")]
    Rasterization(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("recognition timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    /// The page's worker panicked; carries the panic message.
    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("text layer could not be built: {0}")]
    Compositing(String),
}

/// A failed page, with the state it was in when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    /// 0-based page index.
    pub index: usize,
    pub failed_in: PageState,
    pub reason: FailureReason,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {} failed while {}: {}",
            self.index + 1,
            self.failed_in,
            self.reason
        )
    }
}

/// Terminal state of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 0-based page index.
    pub index: usize,
    pub state: PageState,
    /// Words embedded in the page's text layer.
    pub words: usize,
    pub failure: Option<PageFailure>,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every page reached `Assembled`.
    Success,
    /// At least one page failed.
    PartialFailure,
}

/// How the output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// The input already had searchable text and was copied unchanged.
    CopyExisting,
    /// The input had no usable text and a text layer was added.
    OcrApplied,
    /// A text layer was added even though the input had text.
    OcrForced,
}

impl fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingMethod::CopyExisting => "copied existing text",
            ProcessingMethod::OcrApplied => "OCR applied",
            ProcessingMethod::OcrForced => "OCR forced",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: PathBuf,
    /// `None` when no output was written (abort policy).
    pub output: Option<PathBuf>,
    pub method: ProcessingMethod,
    pub status: RunStatus,
    pub analysis: TextAnalysis,
    /// One entry per page in page order; empty for `CopyExisting`.
    pub pages: Vec<PageReport>,
    pub input_size: u64,
    pub output_size: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &PageFailure> {
        self.pages.iter().filter_map(|p| p.failure.as_ref())
    }

    pub fn words_embedded(&self) -> usize {
        self.pages.iter().map(|p| p.words).sum()
    }

    /// Output size relative to input size, in percent.
    pub fn size_change_percent(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        (self.output_size as f64 - self.input_size as f64) / self.input_size as f64 * 100.0
    }
}
