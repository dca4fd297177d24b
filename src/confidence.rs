//! Extraction confidence scoring.
//!
//! Combines text, layout, OCR, and table sub-scores (each 0-100) into a
//! weighted overall grade for the finished artifact.

use crate::enhance::grade;
use crate::pipeline::models::{ConfidenceReport, QualityMetrics, Section};

const TEXT_WEIGHT: f32 = 0.4;
const LAYOUT_WEIGHT: f32 = 0.3;
const OCR_WEIGHT: f32 = 0.2;
const TABLE_WEIGHT: f32 = 0.1;

/// Score a completed extraction.
pub fn score(sections: &[Section], pages: u64, quality: &QualityMetrics) -> ConfidenceReport {
    let text_confidence = text_score(sections, pages, quality);
    let layout_confidence = layout_score(sections);
    let ocr_confidence = ocr_score(sections);
    let table_confidence = table_score(sections);

    let overall = text_confidence * TEXT_WEIGHT
        + layout_confidence * LAYOUT_WEIGHT
        + ocr_confidence * OCR_WEIGHT
        + table_confidence * TABLE_WEIGHT;

    ConfidenceReport {
        text_confidence,
        layout_confidence,
        ocr_confidence,
        table_confidence,
        overall,
        grade: grade(overall),
    }
}

/// Dictionary coverage (via per-section quality) blended with the page
/// extraction success rate.
fn text_score(sections: &[Section], pages: u64, quality: &QualityMetrics) -> f32 {
    if sections.is_empty() {
        return 0.0;
    }
    let avg_quality: f32 =
        sections.iter().map(|s| s.quality_after).sum::<f32>() / sections.len() as f32;

    let lost_pages = quality.pages_failed + quality.pages_ocr_unavailable;
    let success_rate = if pages == 0 {
        0.0
    } else {
        1.0 - (lost_pages.min(pages) as f32 / pages as f32)
    };

    avg_quality * 0.7 + success_rate * 100.0 * 0.3
}

/// Heading/paragraph density across sections.
fn layout_score(sections: &[Section]) -> f32 {
    if sections.is_empty() {
        return 0.0;
    }
    let structured = sections
        .iter()
        .filter(|s| {
            s.text.contains("\n\n")
                || s.text.lines().next().is_some_and(|first| {
                    let t = first.trim();
                    !t.is_empty() && t.len() < 60 && !t.ends_with('.')
                })
        })
        .count();
    structured as f32 / sections.len() as f32 * 100.0
}

/// Average per-page OCR confidence where OCR was used; 100 otherwise.
fn ocr_score(sections: &[Section]) -> f32 {
    let ocr_confidences: Vec<f32> = sections
        .iter()
        .filter(|s| s.ocr_used)
        .filter_map(|s| s.ocr_confidence)
        .collect();
    if ocr_confidences.is_empty() {
        return 100.0;
    }
    ocr_confidences.iter().sum::<f32>() / ocr_confidences.len() as f32 * 100.0
}

/// Fraction of detected tables passing the rectangular-shape heuristic;
/// 100 when no tables were detected.
fn table_score(sections: &[Section]) -> f32 {
    let mut total = 0usize;
    let mut rectangular = 0usize;
    for section in sections {
        for table in &section.tables {
            total += 1;
            if table.is_rectangular() {
                rectangular += 1;
            }
        }
    }
    if total == 0 {
        return 100.0;
    }
    rectangular as f32 / total as f32 * 100.0
}
