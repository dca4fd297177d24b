//! Backing-store adapters.
//!
//! Typed operations over the two stores the pipeline lands into:
//! - vector store (semantic retrieval): Chroma-style REST adapter
//! - document store (structured lookup): generic JSON REST adapter
//!
//! In-memory implementations back tests and offline runs; both kinds share
//! the error taxonomy and health probe shape.

mod document;
mod vector;

pub use document::{DocumentStore, HttpDocumentStore, MemoryDocumentStore, PagedDocs};
pub use vector::{HttpVectorStore, MemoryVectorStore, VectorRecord, VectorStore};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Network-level failure or persistent backend outage.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// Name clash with an incompatible schema.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// A single value exceeded the provider limit.
    #[error("value exceeds store limit of {limit} bytes")]
    Oversize { limit: usize },

    /// Missing collection or document.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store answered with something the adapter cannot interpret.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) | Self::Protocol(_) => "store_unreachable",
            Self::Conflict(_) => "store_conflict",
            Self::Oversize { .. } => "store_oversize",
            Self::NotFound(_) => "store_not_found",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Shared types
// ============================================================================

/// Outcome of `ensure_collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// Probe result for `health()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreHealth {
    Ok,
    Degraded,
    Down,
}

impl StoreHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::unreachable("x").code(), "store_unreachable");
        assert_eq!(StoreError::conflict("x").code(), "store_conflict");
        assert_eq!(StoreError::Oversize { limit: 10 }.code(), "store_oversize");
        assert_eq!(StoreError::Protocol("x".into()).code(), "store_unreachable");
    }

    #[test]
    fn test_health_strings() {
        assert_eq!(StoreHealth::Ok.as_str(), "ok");
        assert_eq!(StoreHealth::Down.as_str(), "down");
    }
}
