//! Extraction pipeline.
//!
//! Session-keyed state machine that drives a document from upload through
//! identification, dedup, page extraction, enhancement, categorization,
//! scoring, the optional novel character pass, and dual-store persistence.
//!
//! - `models`: verdicts, sections, artifacts
//! - `progress`: per-session broadcast of progress events
//! - `session`: session state and the in-process registry
//! - `orchestrator`: the stage driver

pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod session;

pub use models::{Artifact, Derivation, Section, Verdict};
pub use orchestrator::{AnalyzeOptions, ExtractOptions, Pipeline, PipelineDeps};
pub use progress::ProgressEvent;
pub use session::{Session, SessionRegistry, SessionSnapshot};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::dedup::RegistryEntry;
use crate::llm::AiError;
use crate::pdf::PdfError;
use crate::storage::StoreError;

// ============================================================================
// Stages
// ============================================================================

/// Pipeline stages, in order, plus terminal states. Stage indices are
/// non-decreasing over a session's life; terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Uploaded,
    Identifying,
    Identified,
    DedupCheck,
    Extracting,
    Enhancing,
    Categorizing,
    Scoring,
    NovelCharacters,
    Persisting,
    Completed,
    FailedIdentification,
    FailedExtraction,
    FailedPersistence,
    RejectedDuplicate,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploaded => "uploaded",
            Self::Identifying => "identifying",
            Self::Identified => "identified",
            Self::DedupCheck => "dedup_check",
            Self::Extracting => "extracting",
            Self::Enhancing => "enhancing",
            Self::Categorizing => "categorizing",
            Self::Scoring => "scoring",
            Self::NovelCharacters => "novel_characters",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
            Self::FailedIdentification => "failed_identification",
            Self::FailedExtraction => "failed_extraction",
            Self::FailedPersistence => "failed_persistence",
            Self::RejectedDuplicate => "rejected_duplicate",
            Self::Cancelled => "cancelled",
        }
    }

    /// Monotone index: running stages in order, all terminal states above
    /// every running stage.
    pub fn index(&self) -> u32 {
        match self {
            Self::Created => 0,
            Self::Uploaded => 1,
            Self::Identifying => 2,
            Self::Identified => 3,
            Self::DedupCheck => 4,
            Self::Extracting => 5,
            Self::Enhancing => 6,
            Self::Categorizing => 7,
            Self::Scoring => 8,
            Self::NovelCharacters => 9,
            Self::Persisting => 10,
            Self::Completed
            | Self::FailedIdentification
            | Self::FailedExtraction
            | Self::FailedPersistence
            | Self::RejectedDuplicate
            | Self::Cancelled => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.index() >= 100
    }

    /// CLI exit code for a terminal state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::FailedIdentification => 3,
            Self::FailedExtraction => 4,
            Self::FailedPersistence => 5,
            Self::RejectedDuplicate => 6,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("upload of {size} bytes exceeds the {limit}-byte limit")]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("unknown or expired session '{0}'")]
    BadSession(String),

    #[error("session is in state '{state}'; expected '{expected}'")]
    WrongState { state: &'static str, expected: &'static str },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Both stores failed at persist time.
    #[error("persistence failed in both stores (vector: {vector}; document: {document})")]
    BothStoresFailed { vector: String, document: String },

    /// A terminal verdict, not strictly an error: the work was already
    /// ingested.
    #[error("file already ingested on {}", prior.first_ingested_at.format("%Y-%m-%d"))]
    RejectedDuplicate { prior: Box<RegistryEntry> },

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded during {stage}")]
    DeadlineExceeded { stage: &'static str },
}

impl PipelineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pdf(e) => e.code(),
            Self::UploadTooLarge { .. } => "upload_too_large",
            Self::BadSession(_) | Self::WrongState { .. } => "bad_session",
            Self::Catalog(e) => e.code(),
            Self::Ai(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::BothStoresFailed { .. } => "store_unreachable",
            Self::RejectedDuplicate { .. } => "rejected_duplicate",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }

    /// Short remediation hint for the human-facing message.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Ai(AiError::Unauthorized(_)) => Some("set a provider key".to_string()),
            Self::Pdf(PdfError::Encrypted) => {
                Some("remove the PDF password before uploading".to_string())
            }
            Self::UploadTooLarge { limit, .. } => {
                Some(format!("stay under {limit} bytes or raise UPLOAD_MAX_BYTES"))
            }
            Self::Store(StoreError::Unreachable(_)) | Self::BothStoresFailed { .. } => {
                Some("check the store URLs and that the backends are running".to_string())
            }
            // The display string already names the prior ingestion date.
            Self::RejectedDuplicate { .. } => None,
            _ => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

// ============================================================================
// Tests
// ============================================================================
