//! Detection of PDFs that already carry a usable text layer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{DetectionConfig, Document};

/// Which extractor produced the character counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    /// Per-page extraction with lopdf.
    Lopdf,
    /// Whole-document extraction with pdf-extract.
    PdfExtract,
    /// No extractor produced text.
    None,
}

/// Text statistics of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub total_pages: usize,
    pub pages_with_text: usize,
    pub total_characters: usize,
    pub average_chars_per_page: f64,
    pub method: AnalysisMethod,
    /// False when the document already has enough searchable text.
    pub needs_ocr: bool,
}

/// Character count after collapsing whitespace runs to single spaces.
fn clean_len(text: &str) -> usize {
    let mut count = 0;
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            count += 1;
        }
        count += word.chars().count();
    }
    count
}

/// Per-page cleaned character counts, or `None` if lopdf could not extract any page.
fn count_with_lopdf(doc: &Document) -> Option<Vec<usize>> {
    let pdf = doc.pdf();
    let mut failures = 0;
    let counts: Vec<usize> = (1..=doc.page_count() as u32)
        .map(|n| match pdf.extract_text(&[n]) {
            Ok(text) => clean_len(&text),
            Err(e) => {
                debug!("lopdf text extraction failed on page {}: {}", n, e);
                failures += 1;
                0
            }
        })
        .collect();

    if failures == counts.len() {
        None
    } else {
        Some(counts)
    }
}

/// Per-page counts from pdf-extract, splitting on form feeds when present.
fn count_with_pdf_extract(doc: &Document) -> Option<Vec<usize>> {
    let text = match pdf_extract::extract_text_from_mem(doc.raw()) {
        Ok(text) => text,
        Err(e) => {
            warn!("pdf-extract failed: {}", e);
            return None;
        }
    };

    let pages: Vec<&str> = text.split('\u{0C}').collect();
    if pages.len() == doc.page_count() {
        return Some(pages.iter().map(|p| clean_len(p)).collect());
    }

    // No page boundaries: spread the total evenly.
    let total = clean_len(&text);
    let n = doc.page_count().max(1);
    Some(vec![total / n; n])
}

/// Decide whether `doc` needs OCR.
///
/// A document counts as searchable when its total and per-page character
/// counts both exceed `min_text_chars` and at least `min_text_page_ratio` of
/// its pages each exceed `min_text_chars`.
pub fn analyze(doc: &Document, config: &DetectionConfig) -> TextAnalysis {
    let (counts, method) = match count_with_lopdf(doc) {
        Some(counts) => (counts, AnalysisMethod::Lopdf),
        None => match count_with_pdf_extract(doc) {
            Some(counts) => (counts, AnalysisMethod::PdfExtract),
            None => (vec![0; doc.page_count()], AnalysisMethod::None),
        },
    };

    let analysis = summarize(&counts, method, config);
    if analysis.needs_ocr {
        info!(
            "OCR needed: {} characters total, {:.1} per page",
            analysis.total_characters, analysis.average_chars_per_page
        );
    } else {
        info!(
            "Document already searchable: {}/{} pages with text",
            analysis.pages_with_text, analysis.total_pages
        );
    }
    analysis
}

fn summarize(counts: &[usize], method: AnalysisMethod, config: &DetectionConfig) -> TextAnalysis {
    let total_pages = counts.len();
    let total_characters: usize = counts.iter().sum();
    let pages_with_text = counts.iter().filter(|c| **c > config.min_text_chars).count();
    let average_chars_per_page = if total_pages > 0 {
        total_characters as f64 / total_pages as f64
    } else {
        0.0
    };
    let page_ratio = if total_pages > 0 {
        pages_with_text as f64 / total_pages as f64
    } else {
        0.0
    };

    let searchable = total_characters > config.min_text_chars
        && average_chars_per_page > config.min_text_chars as f64
        && page_ratio >= config.min_text_page_ratio;

    TextAnalysis {
        total_pages,
        pages_with_text,
        total_characters,
        average_chars_per_page,
        method,
        needs_ocr: !searchable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_len_collapses_whitespace() {
        assert_eq!(clean_len("  a \n\n bc\t d "), 6);
        assert_eq!(clean_len(""), 0);
        assert_eq!(clean_len("ñandú"), 5);
    }

    #[test]
    fn test_scanned_document_needs_ocr() {
        let analysis = summarize(&[0, 3, 0], AnalysisMethod::Lopdf, &DetectionConfig::default());
        assert!(analysis.needs_ocr);
        assert_eq!(analysis.pages_with_text, 0);
    }

    #[test]
    fn test_text_document_is_searchable() {
        let analysis = summarize(&[400, 380, 0], AnalysisMethod::Lopdf, &DetectionConfig::default());
        assert!(!analysis.needs_ocr);
        assert_eq!(analysis.pages_with_text, 2);
        assert_eq!(analysis.total_characters, 780);
    }

    #[test]
    fn test_sparse_text_below_average_needs_ocr() {
        // 60 characters on one of ten pages: total passes, average does not.
        let mut counts = vec![0; 10];
        counts[0] = 60;
        let analysis = summarize(&counts, AnalysisMethod::Lopdf, &DetectionConfig::default());
        assert!(analysis.needs_ocr);
    }
}
