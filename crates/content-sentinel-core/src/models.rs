//! Core data models used throughout Content Sentinel.
//!
//! These types represent registered content locations, the immutable
//! change-log facts written by the detector, and the inputs that flow
//! into a detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::checksum::Checksum;

/// Descriptive metadata attached to a content location and snapshotted
/// into every change-log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Organization context (business unit, region, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_version: Option<String>,
}

/// Logical lifecycle of a location. Rows are never physically removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Active,
    Archived,
    Deleted,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Active => "active",
            ContentStatus::Archived => "archived",
            ContentStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ContentStatus::Active),
            "archived" => Ok(ContentStatus::Archived),
            "deleted" => Ok(ContentStatus::Deleted),
            other => anyhow::bail!("unknown content status: '{}'", other),
        }
    }
}

/// Where a unit of content lives: the slot whose checksum history is tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentLocation {
    pub content_id: i64,
    pub file_name: String,
    /// Absent for single-page documents.
    pub page_number: Option<i64>,
    pub metadata: ContentMetadata,
    pub status: ContentStatus,
    /// Optimistic concurrency counter, starts at 1 and bumps on every update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration payload from the ingestion collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContentLocation {
    pub file_name: String,
    #[serde(default)]
    pub page_number: Option<i64>,
    #[serde(default)]
    pub metadata: ContentMetadata,
}

/// How a detection relates to the previous baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// No baseline existed.
    NewContent,
    /// Baseline checksum differs.
    ModifiedContent,
    /// Baseline checksum is identical.
    UnchangedContent,
    /// The location was deleted. Carries the last known checksum.
    DeletedContent,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::NewContent => "new_content",
            ChangeType::ModifiedContent => "modified_content",
            ChangeType::UnchangedContent => "unchanged_content",
            ChangeType::DeletedContent => "deleted_content",
        }
    }

    pub fn requires_regeneration(&self) -> bool {
        matches!(self, ChangeType::NewContent | ChangeType::ModifiedContent)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_content" => Ok(ChangeType::NewContent),
            "modified_content" => Ok(ChangeType::ModifiedContent),
            "unchanged_content" => Ok(ChangeType::UnchangedContent),
            "deleted_content" => Ok(ChangeType::DeletedContent),
            other => anyhow::bail!("unknown change type: '{}'", other),
        }
    }
}

/// An immutable detection fact. Created exactly once per detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonically increasing, assigned by the store on append.
    pub change_id: i64,
    pub content_id: i64,
    pub content_checksum: Checksum,
    /// Checksum of the baseline this decision was made against.
    pub previous_checksum: Option<Checksum>,
    pub file_name: String,
    pub page_number: Option<i64>,
    pub requires_regeneration: bool,
    pub change_type: ChangeType,
    pub metadata_snapshot: ContentMetadata,
    pub detected_at: DateTime<Utc>,
    pub source_modified_at: DateTime<Utc>,
    /// FAQs tied to the previous checksum at detection time.
    pub existing_faq_count: i64,
    /// Empty for ad-hoc detections.
    pub detection_run_id: String,
    pub since_date: Option<DateTime<Utc>>,
}

/// The latest entry for a content id. Derived, never stored on its own.
pub type BaselineRecord = ChangeLogEntry;

/// A change-log entry before the store has assigned its `change_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeLogEntry {
    pub content_id: i64,
    pub content_checksum: Checksum,
    pub previous_checksum: Option<Checksum>,
    pub file_name: String,
    pub page_number: Option<i64>,
    pub requires_regeneration: bool,
    pub change_type: ChangeType,
    pub metadata_snapshot: ContentMetadata,
    pub detected_at: DateTime<Utc>,
    pub source_modified_at: DateTime<Utc>,
    pub existing_faq_count: i64,
    pub detection_run_id: String,
    pub since_date: Option<DateTime<Utc>>,
}

impl NewChangeLogEntry {
    pub fn with_id(self, change_id: i64) -> ChangeLogEntry {
        ChangeLogEntry {
            change_id,
            content_id: self.content_id,
            content_checksum: self.content_checksum,
            previous_checksum: self.previous_checksum,
            file_name: self.file_name,
            page_number: self.page_number,
            requires_regeneration: self.requires_regeneration,
            change_type: self.change_type,
            metadata_snapshot: self.metadata_snapshot,
            detected_at: self.detected_at,
            source_modified_at: self.source_modified_at,
            existing_faq_count: self.existing_faq_count,
            detection_run_id: self.detection_run_id,
            since_date: self.since_date,
        }
    }
}

/// One detection input: a location plus the freshly computed checksum.
///
/// The checksum arrives unvalidated; the detector rejects malformed
/// digests before anything is written.
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub location: ContentLocation,
    pub checksum: String,
    pub source_modified_at: Option<DateTime<Utc>>,
    /// Overrides the location's registered metadata for the snapshot.
    pub metadata: Option<ContentMetadata>,
}

/// Run context a detection is tagged with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTag {
    pub run_id: String,
    pub since: Option<DateTime<Utc>>,
}

impl RunTag {
    /// Tag for a single detection outside any run.
    pub fn ad_hoc() -> Self {
        Self::default()
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.run_id.is_empty()
    }
}
