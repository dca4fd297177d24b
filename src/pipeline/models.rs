//! Pipeline data models: classification verdicts, extracted sections, and
//! the final artifact.
//!
//! Records are closed: readers see fixed fields plus one open `extra` map
//! for provider-specific metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::ContentKind;
use crate::enhance::CorrectionCounts;
use crate::novel::CharacterReport;

// ============================================================================
// Verdict
// ============================================================================

/// How a classification verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    ExplicitTitle,
    AiInference,
    ManualOverride,
    FallbackKeyword,
}

impl Derivation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitTitle => "explicit_title",
            Self::AiInference => "ai_inference",
            Self::ManualOverride => "manual_override",
            Self::FallbackKeyword => "fallback_keyword",
        }
    }
}

/// The classification output consumed by all downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: ContentKind,
    /// Game system identifier ("dnd", "coc", ...).
    pub game: String,
    pub edition: String,
    /// Book code ("phb", "core", ...).
    pub book: String,
    /// Book display title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Canonical ISBN-10, when found in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn_10: Option<String>,
    /// Canonical ISBN-13, when found in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn_13: Option<String>,
    pub confidence: f32,
    pub rationale: String,
    pub derivation: Derivation,
    /// Open metadata; the only untagged map in the record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Verdict {
    /// The canonical ISBN used for duplicate checks (ISBN-13 form).
    pub fn canonical_isbn(&self) -> Option<&str> {
        self.isbn_13.as_deref()
    }
}

// ============================================================================
// Sections and tables
// ============================================================================

/// (id, page, ordinal) locator for an extracted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLocator {
    pub id: String,
    pub page: u32,
    pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub locator: TableLocator,
}

impl SectionTable {
    pub fn is_rectangular(&self) -> bool {
        let width = self.headers.len();
        width >= 2 && self.rows.iter().all(|r| r.len() == width)
    }
}

/// An extraction unit. (page, ordinal) uniquely identifies a section
/// within a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Source page, 1-based.
    pub page: u32,
    /// Ordinal within the page, 0-based.
    pub ordinal: u32,
    pub raw_text: String,
    /// Post-enhancement text.
    pub text: String,
    pub category: String,
    pub category_confidence: f32,
    pub has_table: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<SectionTable>,
    #[serde(default)]
    pub ocr_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
    /// Quality score of the raw text, 0-100.
    pub quality_before: f32,
    /// Quality score of the enhanced text, 0-100.
    pub quality_after: f32,
}

impl Section {
    pub fn word_count(&self) -> u64 {
        self.text.split_whitespace().count() as u64
    }

    /// Sort key honoring the (page, ordinal) ordering guarantee.
    pub fn order_key(&self) -> (u32, u32) {
        (self.page, self.ordinal)
    }
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactCounts {
    pub pages: u64,
    pub words: u64,
    pub sections: u64,
    /// Per-category section histogram, insertion-ordered.
    pub by_category: IndexMap<String, u64>,
    /// Per-category word counts.
    pub words_by_category: IndexMap<String, u64>,
}

impl ArtifactCounts {
    pub fn from_sections(pages: u64, sections: &[Section]) -> Self {
        let mut counts = Self { pages, ..Default::default() };
        for section in sections {
            let words = section.word_count();
            counts.words += words;
            counts.sections += 1;
            *counts.by_category.entry(section.category.clone()).or_default() += 1;
            *counts
                .words_by_category
                .entry(section.category.clone())
                .or_default() += words;
        }
        counts
    }
}

/// Confidence record produced by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub text_confidence: f32,
    pub layout_confidence: f32,
    pub ocr_confidence: f32,
    pub table_confidence: f32,
    /// Weighted mean of the sub-scores, 0-100.
    pub overall: f32,
    pub grade: char,
}

/// Document-level text-quality metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub score_before: f32,
    pub score_after: f32,
    pub grade_before: char,
    pub grade_after: char,
    pub corrections: CorrectionCounts,
    /// Pages whose extraction failed (recovered, counted here).
    pub pages_failed: u64,
    /// Pages extracted through OCR.
    pub pages_ocr: u64,
    /// Pages skipped because OCR was needed but unavailable.
    pub pages_ocr_unavailable: u64,
    /// Pages where the enhancer fell back to raw text.
    pub pages_enhance_failed: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            score_before: 0.0,
            score_after: 0.0,
            grade_before: 'F',
            grade_after: 'F',
            corrections: CorrectionCounts::default(),
            pages_failed: 0,
            pages_ocr: 0,
            pages_ocr_unavailable: 0,
            pages_enhance_failed: 0,
            notes: Vec::new(),
        }
    }
}

impl Default for ConfidenceReport {
    fn default() -> Self {
        Self {
            text_confidence: 0.0,
            layout_confidence: 0.0,
            ocr_confidence: 100.0,
            table_confidence: 100.0,
            overall: 0.0,
            grade: 'F',
        }
    }
}

// ============================================================================
// Artifact
// ============================================================================

/// The complete result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub verdict: Verdict,
    /// Ordered by (page, ordinal).
    pub sections: Vec<Section>,
    pub counts: ArtifactCounts,
    pub confidence: ConfidenceReport,
    pub quality: QualityMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<CharacterReport>,
    pub ingested_at: DateTime<Utc>,
    /// Sha-256 of the source document.
    pub source_digest: String,
}

// ============================================================================
// Tests
// ============================================================================
