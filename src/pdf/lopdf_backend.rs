//! lopdf-backed facade implementation.
//!
//! Native text comes from lopdf's extractor. Pages with no usable text
//! layer fall back to the injected `OcrEngine`; without one, the page
//! degrades to `ocr_unavailable` and the pipeline skips its contribution.

use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{Document as LopdfDocument, Object};

use super::{
    tables_from_text, FirstPages, OcrEngine, PageText, PdfDocument, PdfError, PdfFacade,
    PdfMetadata, PdfResult, PdfTable,
};

/// Minimum character count for a page's native text layer to be trusted.
/// Below this the page is treated as scanned and routed to OCR.
const NATIVE_TEXT_FLOOR: usize = 16;

pub struct LopdfFacade {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl LopdfFacade {
    pub fn new() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr: Some(ocr) }
    }
}

impl Default for LopdfFacade {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfFacade for LopdfFacade {
    async fn open(&self, bytes: &[u8]) -> PdfResult<Box<dyn PdfDocument>> {
        // lopdf parsing is CPU-bound; hand it to the blocking pool.
        let owned = bytes.to_vec();
        let doc = tokio::task::spawn_blocking(move || LopdfDocument::load_mem(&owned))
            .await
            .map_err(|e| PdfError::Unreadable(e.to_string()))?
            .map_err(|e| PdfError::Unreadable(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(PdfError::Empty);
        }

        let metadata = read_metadata(&doc, page_numbers.len());
        Ok(Box::new(OpenedPdf {
            doc: Arc::new(doc),
            bytes: Arc::from(bytes.to_vec().into_boxed_slice()),
            metadata,
            page_numbers,
            ocr: self.ocr.clone(),
        }))
    }
}

struct OpenedPdf {
    doc: Arc<LopdfDocument>,
    bytes: Arc<[u8]>,
    metadata: PdfMetadata,
    /// Sorted 1-based page numbers as lopdf reports them.
    page_numbers: Vec<u32>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl std::fmt::Debug for OpenedPdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedPdf")
            .field("metadata", &self.metadata)
            .field("page_numbers", &self.page_numbers)
            .field("has_ocr", &self.ocr.is_some())
            .finish()
    }
}

impl OpenedPdf {
    fn check_page(&self, page: u32) -> PdfResult<()> {
        if page == 0 || page as usize > self.page_numbers.len() {
            return Err(PdfError::PageOutOfRange { page, count: self.page_numbers.len() });
        }
        Ok(())
    }

    async fn native_text(&self, page: u32) -> PdfResult<String> {
        let doc = Arc::clone(&self.doc);
        let page_no = self.page_numbers[(page - 1) as usize];
        tokio::task::spawn_blocking(move || doc.extract_text(&[page_no]))
            .await
            .map_err(|e| PdfError::PageFailed { page, reason: e.to_string() })?
            .map_err(|e| PdfError::PageFailed { page, reason: e.to_string() })
    }
}

#[async_trait]
impl PdfDocument for OpenedPdf {
    fn metadata(&self) -> PdfMetadata {
        self.metadata.clone()
    }

    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    async fn page_text(&self, page: u32) -> PdfResult<PageText> {
        self.check_page(page)?;

        let native = self.native_text(page).await.unwrap_or_default();
        if native.trim().len() >= NATIVE_TEXT_FLOOR {
            return Ok(PageText::native(native));
        }

        // Scanned or empty text layer: OCR fallback.
        match &self.ocr {
            Some(engine) => {
                let (text, confidence) = engine.recognize_page(&self.bytes, page).await?;
                Ok(PageText {
                    text,
                    ocr_used: true,
                    ocr_confidence: Some(confidence.clamp(0.0, 1.0)),
                })
            }
            None => Err(PdfError::OcrUnavailable { page }),
        }
    }

    async fn page_tables(&self, page: u32) -> PdfResult<Vec<PdfTable>> {
        self.check_page(page)?;
        let text = match self.native_text(page).await {
            Ok(t) => t,
            // No text layer means no delimiter-based tables; not an error.
            Err(_) => return Ok(Vec::new()),
        };
        Ok(tables_from_text(&text))
    }

    async fn first_n_pages_text(&self, n: usize, char_ceiling: usize) -> PdfResult<FirstPages> {
        let mut out = String::new();
        let mut truncated = false;
        let last = n.min(self.page_numbers.len());
        for page in 1..=last as u32 {
            let text = match self.page_text(page).await {
                Ok(p) => p.text,
                Err(e) if e.is_page_local() => continue,
                Err(e) => return Err(e),
            };
            if out.len() + text.len() > char_ceiling {
                let room = char_ceiling.saturating_sub(out.len());
                out.push_str(truncate_on_char_boundary(&text, room));
                truncated = true;
                break;
            }
            out.push_str(&text);
            out.push('\n');
        }
        Ok(FirstPages { text: out, truncated })
    }
}

fn truncate_on_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Metadata
// ============================================================================

fn read_metadata(doc: &LopdfDocument, page_count: usize) -> PdfMetadata {
    let mut meta = PdfMetadata { page_count, ..Default::default() };

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        });

    if let Some(info) = info {
        meta.title = info_string(info, b"Title");
        meta.author = info_string(info, b"Author");
        meta.subject = info_string(info, b"Subject");
        meta.keywords = info_string(info, b"Keywords");
    }
    meta
}

fn info_string(dict: &lopdf::Dictionary, key: &[u8]) -> String {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => decode_pdf_text(bytes),
        _ => String::new(),
    }
}

/// PDF text strings are either UTF-16BE with a BOM or PDFDocEncoding;
/// the latter is close enough to latin-1 for metadata purposes.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf16be() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Player's Handbook".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_text(&bytes), "Player's Handbook");
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_pdf_text(b"Monster Manual"), "Monster Manual");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_on_char_boundary("abcdef", 3), "abc");
        // Multi-byte character straddling the cut is dropped whole.
        let s = "ab\u{00e9}cd";
        let cut = truncate_on_char_boundary(s, 3);
        assert!(s.starts_with(cut));
        assert!(cut.len() <= 3);
    }

    #[tokio::test]
    async fn test_open_garbage_is_unreadable() {
        let facade = LopdfFacade::new();
        let err = facade.open(b"not a pdf at all").await.unwrap_err();
        assert_eq!(err.code(), "pdf_unreadable");
    }
}
