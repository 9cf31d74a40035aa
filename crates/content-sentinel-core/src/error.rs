//! Error taxonomy for the detection engine.
//!
//! Storage backends return [`anyhow::Result`] like the rest of the
//! application; engine operations wrap those failures in
//! [`EngineError::Storage`] and add the domain-specific rejections below.
//! Every variant that concerns a single piece of content names its
//! `content_id` so batch callers can report exactly what was rejected.

use thiserror::Error;

use crate::models::ContentStatus;

/// Errors produced by detection, run coordination and the content registry.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The supplied digest is not 64 hexadecimal characters.
    #[error("content {content_id}: invalid checksum format: {reason}")]
    InvalidChecksumFormat { content_id: i64, reason: String },

    /// The source modification timestamp was not supplied.
    #[error("content {content_id}: missing source modification timestamp")]
    MissingModificationTimestamp { content_id: i64 },

    /// A run id was generated or supplied that is already in use.
    #[error("detection run id collision: '{run_id}' is already in use")]
    RunIdCollision { run_id: String },

    /// Detection was tagged with a run that is not currently active.
    #[error("detection run '{run_id}' is not active")]
    UnknownRun { run_id: String },

    /// The FAQ store could not answer in time. Recovered inside the detector.
    #[error("FAQ store unavailable for checksum {checksum}: {reason}")]
    FaqStoreUnavailable { checksum: String, reason: String },

    /// The content id is not present in the registry.
    #[error("content {content_id} is not registered")]
    UnknownContent { content_id: i64 },

    /// The location is archived or deleted and takes no detections.
    #[error("content {content_id} is {status}, not active")]
    InactiveContent {
        content_id: i64,
        status: ContentStatus,
    },

    /// Optimistic version check failed on a registry update.
    #[error("content {content_id}: version conflict (expected {expected}, found {actual})")]
    VersionConflict {
        content_id: i64,
        expected: i64,
        actual: i64,
    },

    /// A location with the same file name and page number already exists.
    #[error("location already registered: {file_name} page {page}")]
    DuplicateLocation { file_name: String, page: String },

    /// The conditional append lost the race against other writers every time.
    #[error("content {content_id}: baseline kept moving after {attempts} attempts")]
    BaselineContention { content_id: i64, attempts: u32 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the error rejects a single input rather than the whole run.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidChecksumFormat { .. }
                | EngineError::MissingModificationTimestamp { .. }
                | EngineError::UnknownContent { .. }
                | EngineError::InactiveContent { .. }
                | EngineError::BaselineContention { .. }
        )
    }

    /// Short machine-readable code used by the HTTP API.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidChecksumFormat { .. } => "invalid_checksum_format",
            EngineError::MissingModificationTimestamp { .. } => "missing_modification_timestamp",
            EngineError::RunIdCollision { .. } => "run_id_collision",
            EngineError::UnknownRun { .. } => "unknown_run",
            EngineError::FaqStoreUnavailable { .. } => "faq_store_unavailable",
            EngineError::UnknownContent { .. } => "not_found",
            EngineError::InactiveContent { .. } => "inactive_content",
            EngineError::VersionConflict { .. } => "version_conflict",
            EngineError::DuplicateLocation { .. } => "duplicate_location",
            EngineError::BaselineContention { .. } => "baseline_contention",
            EngineError::Storage(_) => "internal",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
