//! PDF capability facade.
//!
//! The pipeline never touches PDF bytes directly; it drives these traits:
//!
//! - `PdfFacade`: opens a byte blob into a `PdfDocument`
//! - `PdfDocument`: per-page text, metadata, table regions, bounded
//!   first-pages sample
//! - `OcrEngine`: optional recognition capability consulted when a page
//!   has no native text
//!
//! `LopdfFacade` backs real files; `MemoryPdf` is the deterministic
//! fixture used throughout the test suite.

mod lopdf_backend;
mod memory;

pub use lopdf_backend::LopdfFacade;
pub use memory::{MemoryPage, MemoryPdf, MemoryPdfFacade};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Types
// ============================================================================

/// Document-level metadata. Missing fields are empty strings, not errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub page_count: usize,
}

/// Text of a single page, with its extraction provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub text: String,
    /// True when the text came from the OCR fallback rather than the
    /// native text layer.
    pub ocr_used: bool,
    /// Per-page OCR confidence in [0, 1]; only set when `ocr_used`.
    pub ocr_confidence: Option<f32>,
}

impl PageText {
    pub fn native(text: String) -> Self {
        Self { text, ocr_used: false, ocr_confidence: None }
    }
}

/// A table region detected on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PdfTable {
    /// Rectangular-shape heuristic: every row has the header width.
    pub fn is_rectangular(&self) -> bool {
        let width = self.headers.len();
        width >= 2 && self.rows.iter().all(|r| r.len() == width)
    }
}

/// Bounded sample of the first pages, for identification.
#[derive(Debug, Clone)]
pub struct FirstPages {
    pub text: String,
    /// True when the character ceiling cut the sample short.
    pub truncated: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PdfError {
    /// Structural corruption: the file is not a readable PDF.
    #[error("unreadable PDF: {0}")]
    Unreadable(String),

    /// Password-protected input. No decryption is attempted.
    #[error("PDF is encrypted")]
    Encrypted,

    /// A structurally valid document with zero pages.
    #[error("PDF has no pages")]
    Empty,

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: usize },

    /// Per-page extraction failure. Non-fatal: accounted in metrics.
    #[error("page {page} failed: {reason}")]
    PageFailed { page: u32, reason: String },

    /// The page needs OCR and no engine is available. Non-fatal.
    #[error("page {page} needs OCR but no engine is available")]
    OcrUnavailable { page: u32 },
}

impl PdfError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable(_) => "pdf_unreadable",
            Self::Encrypted => "pdf_encrypted",
            Self::Empty => "pdf_empty",
            Self::PageOutOfRange { .. } | Self::PageFailed { .. } => "page_failed",
            Self::OcrUnavailable { .. } => "ocr_unavailable",
        }
    }

    /// True for errors the pipeline recovers from per page.
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            Self::PageOutOfRange { .. } | Self::PageFailed { .. } | Self::OcrUnavailable { .. }
        )
    }
}

pub type PdfResult<T> = Result<T, PdfError>;

// ============================================================================
// Capability traits
// ============================================================================

/// Opens byte blobs into documents.
#[async_trait]
pub trait PdfFacade: Send + Sync {
    async fn open(&self, bytes: &[u8]) -> PdfResult<Box<dyn PdfDocument>>;
}

/// One opened document.
#[async_trait]
pub trait PdfDocument: Send + Sync + std::fmt::Debug {
    fn metadata(&self) -> PdfMetadata;

    fn page_count(&self) -> usize;

    /// Text of a 1-based page: native text layer if present, otherwise the
    /// OCR fallback (marked in the result).
    async fn page_text(&self, page: u32) -> PdfResult<PageText>;

    /// Table regions on a 1-based page. An empty list is not an error.
    async fn page_tables(&self, page: u32) -> PdfResult<Vec<PdfTable>>;

    /// Concatenated text of the first `n` pages, bounded to `char_ceiling`
    /// characters.
    async fn first_n_pages_text(&self, n: usize, char_ceiling: usize) -> PdfResult<FirstPages>;
}

/// Recognition capability for pages without a native text layer. The engine
/// receives the whole document and rasterizes the page itself.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Returns recognized text and a confidence in [0, 1].
    async fn recognize_page(&self, pdf_bytes: &[u8], page: u32) -> PdfResult<(String, f32)>;
}

// ============================================================================
// Table heuristic
// ============================================================================

/// Detect delimiter-aligned tables in page text.
///
/// A run of two or more consecutive lines that split into the same number
/// (>= 2) of cells on `|` or 2+ spaces is treated as a table; the first
/// line provides the headers.
pub fn tables_from_text(text: &str) -> Vec<PdfTable> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    let flush = |current: &mut Vec<Vec<String>>, tables: &mut Vec<PdfTable>| {
        if current.len() >= 3 {
            let headers = current[0].clone();
            let rows = current[1..].to_vec();
            tables.push(PdfTable { headers, rows });
        }
        current.clear();
    };

    for line in text.lines() {
        let cells = split_cells(line);
        match (&cells, current.last()) {
            (Some(cells), Some(prev)) if cells.len() == prev.len() => {
                current.push(cells.clone());
            }
            (Some(cells), None) => current.push(cells.clone()),
            (Some(cells), Some(_)) => {
                flush(&mut current, &mut tables);
                current.push(cells.clone());
            }
            (None, _) => flush(&mut current, &mut tables),
        }
    }
    flush(&mut current, &mut tables);
    tables
}

fn split_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cells: Vec<String> = if trimmed.contains('|') {
        trimmed
            .split('|')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    } else {
        trimmed
            .split("  ")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    };
    if cells.len() >= 2 {
        Some(cells)
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PdfError::Encrypted.code(), "pdf_encrypted");
        assert_eq!(PdfError::Empty.code(), "pdf_empty");
        assert_eq!(PdfError::Unreadable("x".into()).code(), "pdf_unreadable");
        assert_eq!(PdfError::OcrUnavailable { page: 3 }.code(), "ocr_unavailable");
        assert!(PdfError::OcrUnavailable { page: 3 }.is_page_local());
        assert!(!PdfError::Encrypted.is_page_local());
    }

    #[test]
    fn test_tables_from_text_pipe() {
        let text = "Roll | Result | Notes\n1 | Goblin | hostile\n2 | Orc | hostile\nplain prose";
        let tables = tables_from_text(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Roll", "Result", "Notes"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert!(tables[0].is_rectangular());
    }

    #[test]
    fn test_tables_from_text_spaces() {
        let text = "Level  XP  Proficiency\n1  0  +2\n2  300  +2\n3  900  +2";
        let tables = tables_from_text(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
    }

    #[test]
    fn test_tables_require_three_lines() {
        let text = "a | b\nc | d";
        assert!(tables_from_text(text).is_empty());
    }

    #[test]
    fn test_no_tables_in_prose() {
        let text = "The wizard walked into the tavern.\nNothing tabular here.";
        assert!(tables_from_text(text).is_empty());
    }
}
