//! Page pipeline orchestration.
//!
//! Every page runs through rasterization, recognition, mapping and
//! compositing as its own task. At most `worker_count` pages are in flight,
//! and a page that timed out keeps its slot until its recognition call has
//! really returned. CPU-heavy steps run on blocking threads. Results land in write-once
//! output slots indexed by page, so completion order never affects output
//! order. The finished document is serialized once all slots are terminal.

mod cancel;
mod output;
mod state;

pub use cancel::CancelToken;
pub use output::{write_atomic, OutputDocument, PageSlot, SlotError};
pub use state::{
    FailureReason, PageFailure, PageReport, PageState, ProcessingMethod, RunReport, RunStatus,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::assemble::{self, LayerPatch};
use crate::detect;
use crate::error::{Result, WriteError};
use crate::layer::{self, CompositorOptions};
use crate::models::{Document, OcrLayerConfig, Page, PageFailurePolicy};
use crate::ocr::{self, EngineFactory, EnginePool};
use crate::raster::{MupdfRasterizer, Rasterizer};
use crate::validate;

/// Called whenever a page reaches a terminal state.
pub type ProgressFn = Arc<dyn Fn(&PageReport) + Send + Sync>;

/// Result of processing a document's pages, before anything is written.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub output: OutputDocument,
    /// One report per page, in page order.
    pub pages: Vec<PageReport>,
}

impl ProcessOutcome {
    pub fn status(&self) -> RunStatus {
        if self.pages.iter().all(|p| p.state == PageState::Assembled) {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &PageFailure> {
        self.pages.iter().filter_map(|p| p.failure.as_ref())
    }

    /// Serialize the output document, honoring the page failure policy.
    pub fn into_pdf_bytes(
        self,
        source: &lopdf::Document,
        policy: PageFailurePolicy,
    ) -> std::result::Result<Vec<u8>, WriteError> {
        let failed = self.failures().count();
        if failed > 0 && policy == PageFailurePolicy::Abort {
            return Err(WriteError::Aborted(failed));
        }
        self.output.render(source)
    }
}

/// Drives documents through the page pipeline.
pub struct Pipeline {
    config: OcrLayerConfig,
    rasterizer: Arc<dyn Rasterizer>,
    engines: Arc<EnginePool>,
    cancel: CancelToken,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    /// Pipeline using the engine named in `config.ocr`.
    pub fn new(config: OcrLayerConfig) -> Result<Self> {
        let factory = ocr::engine_factory(&config);
        Self::with_engine_factory(config, factory)
    }

    /// Pipeline whose engines come from `factory`.
    pub fn with_engine_factory(config: OcrLayerConfig, factory: EngineFactory) -> Result<Self> {
        config.validate()?;
        let engines = EnginePool::new(factory, config.pipeline.workers());
        Ok(Self {
            config,
            rasterizer: Arc::new(MupdfRasterizer::new()),
            engines,
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &OcrLayerConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Add a text layer to `input` and write the result to `output`.
    ///
    /// Page failures are reported, not returned as errors. Load, write and
    /// configuration problems are fatal and leave `output` untouched.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<RunReport> {
        let start = Instant::now();

        let doc = {
            let path = input.to_path_buf();
            let max_mb = self.config.validation.max_file_size_mb;
            tokio::task::spawn_blocking(move || Document::open(&path, max_mb)).await??
        };
        validate::validate_output(input, output)?;
        let input_size = doc.raw().len() as u64;

        let (doc, analysis) = {
            let detection = self.config.detection.clone();
            tokio::task::spawn_blocking(move || {
                let analysis = detect::analyze(&doc, &detection);
                (doc, analysis)
            })
            .await?
        };
        if !analysis.needs_ocr && !self.config.pipeline.force_ocr {
            info!("{} already has searchable text, copying", input.display());
            let output_size = write_atomic(output, doc.raw())?;
            return Ok(RunReport {
                input: input.to_path_buf(),
                output: Some(output.to_path_buf()),
                method: ProcessingMethod::CopyExisting,
                status: RunStatus::Success,
                analysis,
                pages: Vec::new(),
                input_size,
                output_size,
                elapsed: start.elapsed(),
            });
        }

        let method = if analysis.needs_ocr {
            ProcessingMethod::OcrApplied
        } else {
            ProcessingMethod::OcrForced
        };

        let outcome = self.process(&doc).await?;
        let status = outcome.status();
        let pages = outcome.pages.clone();

        let (written, output_size) =
            match outcome.into_pdf_bytes(doc.pdf(), self.config.pipeline.on_page_failure) {
                Ok(bytes) => (Some(output.to_path_buf()), write_atomic(output, &bytes)?),
                Err(WriteError::Aborted(failed)) => {
                    warn!("{} page(s) failed; no output written", failed);
                    (None, 0)
                }
                Err(e) => return Err(e.into()),
            };

        Ok(RunReport {
            input: input.to_path_buf(),
            output: written,
            method,
            status,
            analysis,
            pages,
            input_size,
            output_size,
            elapsed: start.elapsed(),
        })
    }

    /// Run every page of `doc` through the pipeline without writing anything.
    pub async fn process(&self, doc: &Document) -> Result<ProcessOutcome> {
        self.preflight().await?;

        let page_count = doc.page_count();
        let workers = self.config.pipeline.workers();
        info!(
            "Processing {} pages with {} workers at {} dpi",
            page_count, workers, self.config.pipeline.dpi
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut task_pages = HashMap::with_capacity(page_count);
        let states: Vec<Arc<Mutex<PageState>>> = (0..page_count)
            .map(|_| Arc::new(Mutex::new(PageState::Pending)))
            .collect();

        for page in doc.pages() {
            let index = page.index;
            let job = PageJob {
                page: page.clone(),
                state: Arc::clone(&states[index]),
                raw: doc.shared_raw(),
                pdf: doc.shared_pdf(),
                rasterizer: Arc::clone(&self.rasterizer),
                engines: Arc::clone(&self.engines),
                dpi: self.config.pipeline.dpi,
                timeout: self.config.pipeline.page_timeout(),
                options: CompositorOptions {
                    confidence_threshold: self.config.pipeline.confidence_threshold,
                    dpi: self.config.pipeline.dpi,
                },
            };
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            let handle = tasks.spawn(async move {
                let cancelled = || PageFailure {
                    index,
                    failed_in: PageState::Pending,
                    reason: FailureReason::Cancelled,
                };

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (index, Err(cancelled())),
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(permit) = permit else {
                    return (index, Err(cancelled()));
                };
                if cancel.is_cancelled() {
                    return (index, Err(cancelled()));
                }

                (index, job.run(permit).await)
            });
            task_pages.insert(handle.id(), index);
        }

        let mut output = OutputDocument::new(page_count);
        let mut reports: Vec<Option<PageReport>> = vec![None; page_count];

        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, result) = match joined {
                Ok((_, done)) => done,
                Err(e) => {
                    let Some(&index) = task_pages.get(&e.id()) else {
                        error!("Unknown page task failed: {}", e);
                        continue;
                    };
                    error!("Page {} task failed: {}", index + 1, e);
                    let failure = PageFailure {
                        index,
                        failed_in: *states[index].lock(),
                        reason: join_failure(e),
                    };
                    (index, Err(failure))
                }
            };

            let report = match result {
                Ok((slot, words)) => {
                    output.fill(index, slot)?;
                    info!("Page {} assembled ({} words)", index + 1, words);
                    PageReport {
                        index,
                        state: PageState::Assembled,
                        words,
                        failure: None,
                    }
                }
                Err(failure) => {
                    output.fill(index, PageSlot::Unchanged)?;
                    warn!("{}", failure);
                    PageReport {
                        index,
                        state: PageState::Failed,
                        words: 0,
                        failure: Some(failure),
                    }
                }
            };

            if let Some(progress) = &self.progress {
                progress(&report);
            }
            reports[index] = Some(report);
        }

        let pages = reports
            .into_iter()
            .enumerate()
            .map(|(index, report)| report.ok_or(SlotError::Missing(index)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let failed = pages.iter().filter(|p| p.failure.is_some()).count();
        info!(
            "Pages done: {} assembled, {} failed",
            page_count - failed,
            failed
        );

        Ok(ProcessOutcome { output, pages })
    }

    /// Make sure at least one engine can be created before any page starts.
    async fn preflight(&self) -> Result<()> {
        let engines = Arc::clone(&self.engines);
        tokio::task::spawn_blocking(move || engines.acquire().map(drop)).await??;
        debug!("OCR engine ready");
        Ok(())
    }
}

/// Failure reason for a task that ended without returning.
fn join_failure(e: JoinError) -> FailureReason {
    if !e.is_panic() {
        return FailureReason::Cancelled;
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    FailureReason::Panicked(message)
}

/// Everything one page task needs; owned so the task is `'static`.
struct PageJob {
    page: Page,
    /// Shared with the collector so a panicked task still reports its state.
    state: Arc<Mutex<PageState>>,
    raw: Arc<Vec<u8>>,
    pdf: Arc<lopdf::Document>,
    rasterizer: Arc<dyn Rasterizer>,
    engines: Arc<EnginePool>,
    dpi: u32,
    timeout: Duration,
    options: CompositorOptions,
}

impl PageJob {
    fn advance(&self, next: PageState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_advance_to(next), "{} -> {}", *state, next);
        trace!("Page {}: {} -> {}", self.page.number(), *state, next);
        *state = next;
    }

    fn fail(&self, reason: FailureReason) -> PageFailure {
        PageFailure {
            index: self.page.index,
            failed_in: *self.state.lock(),
            reason,
        }
    }

    /// Process the page while holding one worker slot.
    ///
    /// The slot moves into the recognition call and is released only when
    /// that call returns, even if the page has already timed out.
    async fn run(
        self,
        permit: OwnedSemaphorePermit,
    ) -> std::result::Result<(PageSlot, usize), PageFailure> {
        self.advance(PageState::Rasterizing);
        let raster = {
            let raw = Arc::clone(&self.raw);
            let page = self.page.clone();
            let rasterizer = Arc::clone(&self.rasterizer);
            let dpi = self.dpi;
            tokio::task::spawn_blocking(move || rasterizer.rasterize(&raw, &page, dpi)).await
        };
        let raster = match raster {
            Ok(Ok(raster)) => raster,
            Ok(Err(e)) => return Err(self.fail(FailureReason::Rasterization(e.to_string()))),
            Err(e) => return Err(self.fail(join_failure(e))),
        };
        let geometry = raster.geometry;

        self.advance(PageState::Recognizing);
        let recognition = {
            let engines = Arc::clone(&self.engines);
            let image = raster.image;
            tokio::task::spawn_blocking(move || {
                let words = engines.acquire().and_then(|mut engine| engine.recognize(&image));
                (permit, words)
            })
        };
        let (_permit, words) = match tokio::time::timeout(self.timeout, recognition).await {
            Err(_) => return Err(self.fail(FailureReason::Timeout)),
            Ok(Err(e)) => return Err(self.fail(join_failure(e))),
            Ok(Ok((_, Err(e)))) => return Err(self.fail(FailureReason::Recognition(e.to_string()))),
            Ok(Ok((permit, Ok(words)))) => (permit, words),
        };
        debug!("Page {}: {} words recognized", self.page.number(), words.len());

        self.advance(PageState::Mapping);
        let placed = layer::place_words(&words, &geometry, &self.options);
        drop(words);

        self.advance(PageState::Compositing);
        if placed.is_empty() {
            self.advance(PageState::Assembled);
            return Ok((PageSlot::Unchanged, 0));
        }

        let resources = assemble::materialize_resources(&self.pdf, self.page.object_id);
        let font_key = assemble::unused_font_key(&resources);
        let text_layer = layer::render(placed, &geometry, &font_key)
            .map_err(|e| self.fail(FailureReason::Compositing(e)))?;

        self.advance(PageState::Assembled);
        let count = text_layer.words.len();
        let slot = PageSlot::Layer {
            patch: LayerPatch {
                page_id: self.page.object_id,
                resources,
                font_key,
                content: text_layer.content,
            },
            words: text_layer.words,
        };
        Ok((slot, count))
    }
}
