//! Storage abstraction for Content Sentinel.
//!
//! Three seams separate the engine from its backends:
//!
//! | Trait | Owner | Purpose |
//! |-------|-------|---------|
//! | [`ChangeLog`] | detector (sole writer) | append-only detection history |
//! | [`ContentRegistry`] | ingestion collaborator | content locations with optimistic versioning |
//! | [`FaqStore`] | FAQ pipeline (read-only here) | FAQ counts per checksum |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::checksum::Checksum;
use crate::error::EngineResult;
use crate::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, NewChangeLogEntry,
    NewContentLocation,
};

/// Result of a conditional append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The entry was written and assigned a `change_id`.
    Committed(ChangeLogEntry),
    /// Another writer appended for the same content id first. Nothing written.
    BaselineMoved,
}

/// Append-only detection history.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append`](ChangeLog::append) | Conditionally append one entry |
/// | [`latest`](ChangeLog::latest) | Baseline for one content id |
/// | [`latest_all`](ChangeLog::latest_all) | Baseline for every content id |
/// | [`history`](ChangeLog::history) | All entries for one content id, oldest first |
/// | [`run_entries`](ChangeLog::run_entries) | All entries tagged with a run |
/// | [`run_ids`](ChangeLog::run_ids) | Distinct run ids, ascending |
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Append `entry` only if the current baseline for its content id has
    /// `change_id == expected_baseline` (`None` meaning "no entries yet").
    ///
    /// The check and the write are a single atomic step: either a complete
    /// entry is stored or nothing is.
    async fn append(
        &self,
        entry: NewChangeLogEntry,
        expected_baseline: Option<i64>,
    ) -> Result<AppendOutcome>;

    /// The entry with the greatest `(detected_at, change_id)` for `content_id`.
    async fn latest(&self, content_id: i64) -> Result<Option<ChangeLogEntry>>;

    /// The latest entry of every content id, in ascending content id order.
    async fn latest_all(&self) -> Result<Vec<ChangeLogEntry>>;

    /// Every entry for `content_id` ordered by `(detected_at, change_id)` ascending.
    async fn history(&self, content_id: i64) -> Result<Vec<ChangeLogEntry>>;

    /// Every entry tagged with `run_id`, ordered by `change_id`.
    async fn run_entries(&self, run_id: &str) -> Result<Vec<ChangeLogEntry>>;

    /// Distinct non-empty run ids, ascending.
    async fn run_ids(&self) -> Result<Vec<String>>;

    async fn run_exists(&self, run_id: &str) -> Result<bool>;

    /// Total number of entries.
    async fn count(&self) -> Result<i64>;
}

/// Durable record of known content locations.
#[async_trait]
pub trait ContentRegistry: Send + Sync {
    /// Register a new location. Fails with `DuplicateLocation` when
    /// `(file_name, page_number)` is already known.
    async fn register(&self, new: &NewContentLocation) -> EngineResult<ContentLocation>;

    async fn get(&self, content_id: i64) -> EngineResult<Option<ContentLocation>>;

    async fn find(
        &self,
        file_name: &str,
        page_number: Option<i64>,
    ) -> EngineResult<Option<ContentLocation>>;

    /// Replace metadata if the stored version still equals `expected_version`.
    async fn update_metadata(
        &self,
        content_id: i64,
        expected_version: i64,
        metadata: &ContentMetadata,
    ) -> EngineResult<ContentLocation>;

    /// Change the logical status if the stored version still equals `expected_version`.
    async fn set_status(
        &self,
        content_id: i64,
        expected_version: i64,
        status: ContentStatus,
    ) -> EngineResult<ContentLocation>;

    /// All locations in ascending content id order.
    async fn list(&self) -> EngineResult<Vec<ContentLocation>>;
}

/// Read-only view of the external FAQ store.
#[async_trait]
pub trait FaqStore: Send + Sync {
    /// Number of FAQs currently associated with `checksum`.
    async fn count_faqs(&self, checksum: &Checksum) -> Result<i64>;
}
