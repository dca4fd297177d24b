//! Document identification.
//!
//! Two-pass protocol:
//! 1. explicit-title scan over the first pages (catalog synonym table)
//! 2. AI verdict with confidence; on malformed output or provider
//!    exhaustion, a pure keyword vote capped at 0.6 confidence
//!
//! ISBNs are scanned from the first and last three pages with checksum
//! validation, and a caller-supplied manual override replaces fields and
//! forces confidence 1.0.

pub mod isbn;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{normalize_title_text, ContentKind, GameCatalog, GameSystem};
use crate::llm::{CallOptions, IdentifyOutcome, ProviderClient};
use crate::pdf::{PdfDocument, PdfResult};
use crate::pipeline::models::{Derivation, Verdict};

/// Pages sampled for the title/AI passes.
const IDENTIFY_PAGE_SPAN: usize = 15;
/// Pages scanned from each end for ISBNs.
const ISBN_PAGE_SPAN: u32 = 3;
/// Upper bound on keyword-fallback confidence.
const FALLBACK_CONFIDENCE_CAP: f32 = 0.6;

/// Caller-supplied classification override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualOverride {
    pub game: Option<String>,
    pub edition: Option<String>,
    pub book: Option<String>,
    pub kind: Option<ContentKind>,
}

impl ManualOverride {
    pub fn is_empty(&self) -> bool {
        self.game.is_none() && self.edition.is_none() && self.book.is_none() && self.kind.is_none()
    }
}

pub struct Identifier {
    catalog: std::sync::Arc<GameCatalog>,
    identify_char_ceiling: usize,
}

impl Identifier {
    pub fn new(catalog: std::sync::Arc<GameCatalog>, identify_char_ceiling: usize) -> Self {
        Self { catalog, identify_char_ceiling }
    }

    /// Run the identification protocol against an opened document.
    ///
    /// Never fails on provider trouble: the keyword fallback always yields
    /// a verdict. PDF errors reading the sample do surface.
    pub async fn identify(
        &self,
        doc: &dyn PdfDocument,
        kind: ContentKind,
        client: &ProviderClient,
        options: &CallOptions,
        overrides: Option<&ManualOverride>,
    ) -> PdfResult<Verdict> {
        let sample = doc
            .first_n_pages_text(IDENTIFY_PAGE_SPAN, self.identify_char_ceiling)
            .await?;

        let mut verdict = match self.explicit_title(&sample.text, kind) {
            Some(v) => v,
            None => self.ai_or_fallback(&sample.text, kind, client, options).await,
        };

        // ISBN pass over the document edges.
        let findings = self.scan_isbns(doc).await;
        verdict.isbn_10 = findings.isbn_10;
        verdict.isbn_13 = findings.isbn_13;

        if let Some(overrides) = overrides {
            if !overrides.is_empty() {
                apply_override(&mut verdict, overrides);
            }
        }

        // Fill the title from PDF metadata when nothing better exists.
        if verdict.title.is_empty() || verdict.title == "Untitled" {
            let meta_title = doc.metadata().title;
            if !meta_title.is_empty() {
                verdict.title = meta_title;
            }
        }

        Ok(verdict)
    }

    fn explicit_title(&self, sample: &str, kind: ContentKind) -> Option<Verdict> {
        let normalized = normalize_title_text(sample);
        let synonym = self.catalog.find_title(&normalized)?;
        Some(Verdict {
            kind,
            game: synonym.system.as_str().to_string(),
            edition: synonym.edition.to_string(),
            book: synonym.book.to_string(),
            title: synonym.title.to_string(),
            publisher: None,
            isbn_10: None,
            isbn_13: None,
            confidence: 0.97,
            rationale: format!("explicit title: '{}'", synonym.fragment),
            derivation: Derivation::ExplicitTitle,
            extra: BTreeMap::new(),
        })
    }

    async fn ai_or_fallback(
        &self,
        sample: &str,
        kind: ContentKind,
        client: &ProviderClient,
        options: &CallOptions,
    ) -> Verdict {
        match client.identify(sample, kind, options).await {
            Ok(outcome) => self.verdict_from_outcome(outcome, client.id()),
            Err(e) => {
                tracing::warn!(
                    provider = client.id(),
                    code = e.code(),
                    "identification provider failed, using keyword fallback: {e}"
                );
                self.keyword_fallback(sample, kind)
            }
        }
    }

    fn verdict_from_outcome(&self, outcome: IdentifyOutcome, provider: &str) -> Verdict {
        let mut verdict = Verdict {
            kind: outcome.kind,
            game: outcome.game,
            edition: outcome.edition,
            book: outcome.book,
            title: outcome.title,
            publisher: outcome.publisher,
            isbn_10: None,
            isbn_13: None,
            confidence: outcome.confidence.clamp(0.0, 1.0),
            rationale: outcome.rationale,
            derivation: Derivation::AiInference,
            extra: BTreeMap::new(),
        };
        verdict
            .extra
            .insert("provider".to_string(), serde_json::Value::String(provider.to_string()));
        self.reconcile_with_catalog(&mut verdict);
        verdict
    }

    /// Snap an AI verdict onto the catalog where possible: unknown editions
    /// of a known system fall back to the catalog's edition list.
    fn reconcile_with_catalog(&self, verdict: &mut Verdict) {
        let Some(system) = GameSystem::parse(&verdict.game) else {
            return;
        };
        verdict.game = system.as_str().to_string();
        let editions = self.catalog.editions(system);
        if editions.is_empty() {
            return;
        }
        let known = editions.iter().any(|e| e.id.eq_ignore_ascii_case(&verdict.edition));
        if !known {
            if let Some((edition, book)) = self.catalog.fallback_edition_book(system) {
                verdict.edition = edition.to_string();
                if verdict.book.is_empty() {
                    verdict.book = book.code.to_string();
                }
            }
        }
    }

    fn keyword_fallback(&self, sample: &str, kind: ContentKind) -> Verdict {
        let detection = self.catalog.detect_system(sample);
        let (edition, book, title) = match self.catalog.fallback_edition_book(detection.system) {
            Some((edition, book)) if detection.system != GameSystem::Other => (
                edition.to_string(),
                book.code.to_string(),
                book.title.to_string(),
            ),
            _ => ("unknown".to_string(), "unknown".to_string(), String::new()),
        };

        Verdict {
            kind,
            game: detection.system.as_str().to_string(),
            edition,
            book,
            title,
            publisher: None,
            isbn_10: None,
            isbn_13: None,
            confidence: detection.confidence.min(FALLBACK_CONFIDENCE_CAP),
            rationale: if detection.matched.is_empty() {
                "keyword fallback: no vocabulary matched".to_string()
            } else {
                format!("keyword fallback: {}", detection.matched.join(", "))
            },
            derivation: Derivation::FallbackKeyword,
            extra: BTreeMap::new(),
        }
    }

    async fn scan_isbns(&self, doc: &dyn PdfDocument) -> isbn::IsbnFindings {
        let count = doc.page_count() as u32;
        let mut pages: Vec<u32> = (1..=count.min(ISBN_PAGE_SPAN)).collect();
        for page in count.saturating_sub(ISBN_PAGE_SPAN - 1)..=count {
            if page >= 1 && !pages.contains(&page) {
                pages.push(page);
            }
        }

        let mut text = String::new();
        for page in pages {
            if let Ok(page_text) = doc.page_text(page).await {
                text.push_str(&page_text.text);
                text.push('\n');
            }
        }
        isbn::scan(&text)
    }
}

fn apply_override(verdict: &mut Verdict, overrides: &ManualOverride) {
    if let Some(game) = &overrides.game {
        verdict.game = GameSystem::parse(game)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| game.clone());
    }
    if let Some(edition) = &overrides.edition {
        verdict.edition = edition.clone();
    }
    if let Some(book) = &overrides.book {
        verdict.book = book.clone();
    }
    if let Some(kind) = overrides.kind {
        verdict.kind = kind;
    }
    verdict.derivation = Derivation::ManualOverride;
    verdict.confidence = 1.0;
    verdict.rationale = "manual override".to_string();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockProvider, ProviderClient};
    use crate::pdf::{MemoryPdf, MemoryPdfFacade, PdfDocument, PdfFacade};
    use std::sync::Arc;

    fn identifier() -> Identifier {
        Identifier::new(Arc::new(GameCatalog::new()), 5000)
    }

    fn mock_client() -> ProviderClient {
        ProviderClient::new(Arc::new(MockProvider::new(Arc::new(GameCatalog::new()))), 4)
    }

    async fn open(pages: Vec<&str>) -> Box<dyn PdfDocument> {
        MemoryPdfFacade::new(MemoryPdf::from_pages(pages))
            .open(b"fixture")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_explicit_title_shortcut() {
        let doc = open(vec!["PLAYER'S HANDBOOK\nrules for heroes", "more rules"]).await;
        let verdict = identifier()
            .identify(
                doc.as_ref(),
                ContentKind::SourceMaterial,
                &mock_client(),
                &CallOptions::identify(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(verdict.derivation, Derivation::ExplicitTitle);
        assert!(verdict.confidence >= 0.95);
        assert_eq!(verdict.game, "dnd");
        assert_eq!(verdict.edition, "1st");
        assert_eq!(verdict.book, "phb");
    }

    #[tokio::test]
    async fn test_ai_inference_via_mock() {
        let doc = open(vec![
            "A rulebook without its cover page. Roll a saving throw against \
             your armor class; the dungeon master consults hit dice.",
        ])
        .await;
        let verdict = identifier()
            .identify(
                doc.as_ref(),
                ContentKind::SourceMaterial,
                &mock_client(),
                &CallOptions::identify(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(verdict.derivation, Derivation::AiInference);
        assert_eq!(verdict.game, "dnd");
        assert!(verdict.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_isbn_attached_from_back_pages() {
        let doc = open(vec![
            "PLAYER'S HANDBOOK",
            "middle content",
            "Colophon. ISBN 0-306-40615-2. Printed somewhere.",
        ])
        .await;
        let verdict = identifier()
            .identify(
                doc.as_ref(),
                ContentKind::SourceMaterial,
                &mock_client(),
                &CallOptions::identify(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(verdict.isbn_10.as_deref(), Some("0306406152"));
        assert_eq!(verdict.isbn_13.as_deref(), Some("9780306406157"));
    }

    #[tokio::test]
    async fn test_manual_override_wins() {
        let doc = open(vec!["PLAYER'S HANDBOOK"]).await;
        let overrides = ManualOverride {
            game: Some("coc".to_string()),
            edition: Some("7th".to_string()),
            book: Some("keeper".to_string()),
            kind: Some(ContentKind::SourceMaterial),
        };
        let verdict = identifier()
            .identify(
                doc.as_ref(),
                ContentKind::SourceMaterial,
                &mock_client(),
                &CallOptions::identify(),
                Some(&overrides),
            )
            .await
            .unwrap();
        assert_eq!(verdict.derivation, Derivation::ManualOverride);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.game, "coc");
        assert_eq!(verdict.edition, "7th");
    }

    #[tokio::test]
    async fn test_empty_override_is_ignored() {
        let doc = open(vec!["PLAYER'S HANDBOOK"]).await;
        let verdict = identifier()
            .identify(
                doc.as_ref(),
                ContentKind::SourceMaterial,
                &mock_client(),
                &CallOptions::identify(),
                Some(&ManualOverride::default()),
            )
            .await
            .unwrap();
        assert_eq!(verdict.derivation, Derivation::ExplicitTitle);
    }
}
