//! Ordered output slots and final serialization.

use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::assemble::{self, LayerPatch};
use crate::error::WriteError;
use crate::layer::MappedWord;

/// Result placed in a page's output slot.
#[derive(Debug, Clone)]
pub enum PageSlot {
    /// The page gets a text layer.
    Layer {
        patch: LayerPatch,
        words: Vec<MappedWord>,
    },
    /// The page is emitted as it was: no words, or it failed under `degrade`.
    Unchanged,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("page index {index} out of range ({len} pages)")]
    OutOfRange { index: usize, len: usize },

    #[error("output slot for page index {0} already written")]
    AlreadyWritten(usize),

    #[error("no result was produced for page index {0}")]
    Missing(usize),
}

/// One write-once slot per input page, in page order.
#[derive(Debug)]
pub struct OutputDocument {
    slots: Vec<Option<PageSlot>>,
}

impl OutputDocument {
    pub fn new(page_count: usize) -> Self {
        Self {
            slots: vec![None; page_count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write a page's slot. Each slot can be written once.
    pub fn fill(&mut self, index: usize, slot: PageSlot) -> Result<(), SlotError> {
        let len = self.slots.len();
        let entry = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, len })?;
        if entry.is_some() {
            return Err(SlotError::AlreadyWritten(index));
        }
        *entry = Some(slot);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Slots in page order; unwritten slots are `None`.
    pub fn slots(&self) -> impl Iterator<Item = Option<&PageSlot>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Mapped words of a page's text layer, empty for unchanged pages.
    pub fn words(&self, index: usize) -> &[MappedWord] {
        match self.slots.get(index) {
            Some(Some(PageSlot::Layer { words, .. })) => words,
            _ => &[],
        }
    }

    /// Apply all text layers to a copy of `source` and serialize it.
    ///
    /// Unwritten slots are treated as unchanged pages.
    pub fn render(self, source: &lopdf::Document) -> Result<Vec<u8>, WriteError> {
        let patches: Vec<LayerPatch> = self
            .slots
            .into_iter()
            .flatten()
            .filter_map(|slot| match slot {
                PageSlot::Layer { patch, .. } => Some(patch),
                PageSlot::Unchanged => None,
            })
            .collect();

        let mut doc = source.clone();
        let patched = assemble::apply_patches(&mut doc, patches).map_err(WriteError::Serialize)?;
        debug!("Applied {} text layers", patched);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| WriteError::Serialize(e.to_string()))?;
        Ok(bytes)
    }
}

/// Write `bytes` to `path` through a temporary file in the same directory.
///
/// The destination is only replaced once the data is fully written.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64, WriteError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |source: std::io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".ocrlayer-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;
    temp.write_all(bytes).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes.len() as u64)
}
