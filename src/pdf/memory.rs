//! In-memory PDF fixture.
//!
//! Deterministic document used by unit, property, and integration tests:
//! pages are provided as strings, optionally marked as OCR-only or failing,
//! with explicit tables or tables detected from the text.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    tables_from_text, FirstPages, PageText, PdfDocument, PdfError, PdfFacade, PdfMetadata,
    PdfResult, PdfTable,
};

/// One fixture page.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    pub text: String,
    /// Simulate a scanned page: text only reachable through OCR with the
    /// given confidence. `None` confidence simulates a missing OCR engine.
    pub ocr: Option<Option<f32>>,
    /// Explicit tables; when empty, tables are detected from the text.
    pub tables: Vec<PdfTable>,
    /// Simulate per-page extraction failure.
    pub fail: bool,
}

impl MemoryPage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    pub fn ocr(text: impl Into<String>, confidence: f32) -> Self {
        Self { text: text.into(), ocr: Some(Some(confidence)), ..Default::default() }
    }

    pub fn ocr_unavailable() -> Self {
        Self { ocr: Some(None), ..Default::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn with_table(mut self, table: PdfTable) -> Self {
        self.tables.push(table);
        self
    }
}

/// The fixture document.
#[derive(Debug, Clone, Default)]
pub struct MemoryPdf {
    pub metadata: PdfMetadata,
    pub pages: Vec<MemoryPage>,
}

impl MemoryPdf {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        let metadata = PdfMetadata { page_count: pages.len(), ..Default::default() };
        Self { metadata, pages }
    }

    /// Convenience: one native-text page per string.
    pub fn from_pages<S: Into<String>>(pages: Vec<S>) -> Self {
        Self::new(pages.into_iter().map(|p| MemoryPage::text(p)).collect())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }
}

/// Facade returning a fixed document regardless of input bytes, or a fixed
/// open error for the input-failure cases.
#[derive(Clone, Default)]
pub struct MemoryPdfFacade {
    doc: Option<Arc<MemoryPdf>>,
    open_error: Option<&'static str>,
}

impl MemoryPdfFacade {
    pub fn new(doc: MemoryPdf) -> Self {
        Self { doc: Some(Arc::new(doc)), open_error: None }
    }

    /// Facade whose `open` always fails with the given error code
    /// ("pdf_encrypted", "pdf_empty", or "pdf_unreadable").
    pub fn failing(code: &'static str) -> Self {
        Self { doc: None, open_error: Some(code) }
    }
}

#[async_trait]
impl PdfFacade for MemoryPdfFacade {
    async fn open(&self, _bytes: &[u8]) -> PdfResult<Box<dyn PdfDocument>> {
        if let Some(code) = self.open_error {
            return Err(match code {
                "pdf_encrypted" => PdfError::Encrypted,
                "pdf_empty" => PdfError::Empty,
                _ => PdfError::Unreadable("fixture".to_string()),
            });
        }
        let doc = self.doc.clone().expect("fixture document");
        if doc.pages.is_empty() {
            return Err(PdfError::Empty);
        }
        Ok(Box::new(OpenedMemoryPdf { doc }))
    }
}

#[derive(Debug)]
struct OpenedMemoryPdf {
    doc: Arc<MemoryPdf>,
}

impl OpenedMemoryPdf {
    fn page(&self, page: u32) -> PdfResult<&MemoryPage> {
        if page == 0 || page as usize > self.doc.pages.len() {
            return Err(PdfError::PageOutOfRange { page, count: self.doc.pages.len() });
        }
        Ok(&self.doc.pages[(page - 1) as usize])
    }
}

#[async_trait]
impl PdfDocument for OpenedMemoryPdf {
    fn metadata(&self) -> PdfMetadata {
        self.doc.metadata.clone()
    }

    fn page_count(&self) -> usize {
        self.doc.pages.len()
    }

    async fn page_text(&self, page: u32) -> PdfResult<PageText> {
        let p = self.page(page)?;
        if p.fail {
            return Err(PdfError::PageFailed { page, reason: "fixture failure".to_string() });
        }
        match p.ocr {
            None => Ok(PageText::native(p.text.clone())),
            Some(Some(confidence)) => Ok(PageText {
                text: p.text.clone(),
                ocr_used: true,
                ocr_confidence: Some(confidence),
            }),
            Some(None) => Err(PdfError::OcrUnavailable { page }),
        }
    }

    async fn page_tables(&self, page: u32) -> PdfResult<Vec<PdfTable>> {
        let p = self.page(page)?;
        if !p.tables.is_empty() {
            return Ok(p.tables.clone());
        }
        Ok(tables_from_text(&p.text))
    }

    async fn first_n_pages_text(&self, n: usize, char_ceiling: usize) -> PdfResult<FirstPages> {
        let mut out = String::new();
        let mut truncated = false;
        for page in 1..=n.min(self.doc.pages.len()) as u32 {
            let text = match self.page_text(page).await {
                Ok(p) => p.text,
                Err(e) if e.is_page_local() => continue,
                Err(e) => return Err(e),
            };
            if out.len() + text.len() > char_ceiling {
                let room = char_ceiling.saturating_sub(out.len());
                let mut end = room.min(text.len());
                while end > 0 && !text.is_char_boundary(end) {
                    end -= 1;
                }
                out.push_str(&text[..end]);
                truncated = true;
                break;
            }
            out.push_str(&text);
            out.push('\n');
        }
        Ok(FirstPages { text: out, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pdf_pages() {
        let facade = MemoryPdfFacade::new(MemoryPdf::from_pages(vec!["one", "two"]));
        let doc = facade.open(b"ignored").await.unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_text(1).await.unwrap().text, "one");
        assert_eq!(doc.page_text(2).await.unwrap().text, "two");
        assert!(doc.page_text(3).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_pdf_ocr_page() {
        let facade = MemoryPdfFacade::new(MemoryPdf::new(vec![
            MemoryPage::text("native"),
            MemoryPage::ocr("scanned", 0.82),
            MemoryPage::ocr_unavailable(),
        ]));
        let doc = facade.open(b"x").await.unwrap();
        assert!(!doc.page_text(1).await.unwrap().ocr_used);
        let ocr = doc.page_text(2).await.unwrap();
        assert!(ocr.ocr_used);
        assert_eq!(ocr.ocr_confidence, Some(0.82));
        assert_eq!(doc.page_text(3).await.unwrap_err().code(), "ocr_unavailable");
    }

    #[tokio::test]
    async fn test_first_pages_truncation() {
        let facade = MemoryPdfFacade::new(MemoryPdf::from_pages(vec!["a".repeat(100)]));
        let doc = facade.open(b"x").await.unwrap();
        let sample = doc.first_n_pages_text(5, 40).await.unwrap();
        assert!(sample.truncated);
        assert_eq!(sample.text.len(), 40);
    }

    #[tokio::test]
    async fn test_failing_facade() {
        let facade = MemoryPdfFacade::failing("pdf_encrypted");
        assert_eq!(facade.open(b"x").await.unwrap_err().code(), "pdf_encrypted");
    }
}
