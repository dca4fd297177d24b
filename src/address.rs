//! Collection addressing.
//!
//! Derives deterministic store names from a classification verdict under
//! one of two layouts:
//! - separate: a dotted path names a distinct collection per book
//! - single-with-folder: everything lands in the `rpger` collection with a
//!   folder path carried as metadata
//!
//! Pure functions; sanitization is idempotent.

use serde::{Deserialize, Serialize};

use crate::pipeline::models::Verdict;

/// The single shared collection used by the single-with-folder layout.
pub const SINGLE_COLLECTION: &str = "rpger";

/// Reserved collection for the duplicate registry.
pub const REGISTRY_COLLECTION: &str = "rpger_registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Separate,
    SingleWithFolder,
}

impl Layout {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "separate" => Some(Self::Separate),
            "single" | "single_with_folder" => Some(Self::SingleWithFolder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Separate => "separate",
            Self::SingleWithFolder => "single_with_folder",
        }
    }
}

/// Addresses derived from one verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAddress {
    /// Book-level collection name: `<game>_<edition>_<book>`.
    pub name: String,
    /// Vector store collection.
    pub vector_collection: String,
    /// Document store collection.
    pub document_collection: String,
    /// Folder path metadata (single-with-folder layout only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Build the address for a verdict under a layout. Deterministic and pure.
pub fn address(verdict: &Verdict, layout: Layout) -> CollectionAddress {
    let kind = sanitize_segment(verdict.kind.as_str());
    let game = sanitize_segment(&verdict.game);
    let edition = sanitize_segment(&verdict.edition);
    let book = sanitize_segment(&verdict.book);
    let name = format!("{game}_{edition}_{book}");

    match layout {
        Layout::Separate => CollectionAddress {
            vector_collection: name.clone(),
            document_collection: format!("{kind}.{game}.{edition}.{book}.{name}"),
            folder: None,
            name,
        },
        Layout::SingleWithFolder => CollectionAddress {
            vector_collection: name.clone(),
            document_collection: SINGLE_COLLECTION.to_string(),
            folder: Some(format!("{kind}/{game}/{edition}/{book}/{name}")),
            name,
        },
    }
}

/// Record id for a section in the vector store.
pub fn section_record_id(collection: &str, page: u32, ordinal: u32) -> String {
    format!("{collection}_page{page}_{ordinal}")
}

/// Lowercase, `&` to `and`, whitespace to `_`, and anything outside
/// `[a-z0-9_]` stripped. Idempotent.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.to_lowercase().chars() {
        match c {
            '&' => out.push_str("and"),
            c if c.is_whitespace() => out.push('_'),
            c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' => out.push(c),
            _ => {}
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
