//! In-memory store implementations for testing and embedding.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock` for thread safety.
//! The conditional append runs under the write lock, which gives the same
//! all-or-nothing guarantee as the SQLite backend's single statement.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::baseline::{latest_per_content, recency_key, select_latest};
use crate::checksum::Checksum;
use crate::clock::truncate_to_micros;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, NewChangeLogEntry,
    NewContentLocation,
};

use super::{AppendOutcome, ChangeLog, ContentRegistry, FaqStore};

/// In-memory append-only change log.
pub struct InMemoryChangeLog {
    entries: RwLock<Vec<ChangeLogEntry>>,
}

impl InMemoryChangeLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ChangeLog for InMemoryChangeLog {
    async fn append(
        &self,
        entry: NewChangeLogEntry,
        expected_baseline: Option<i64>,
    ) -> Result<AppendOutcome> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let current = select_latest(entries.iter().filter(|e| e.content_id == entry.content_id))
            .map(|e| e.change_id);
        if current != expected_baseline {
            return Ok(AppendOutcome::BaselineMoved);
        }
        let change_id = entries.len() as i64 + 1;
        let committed = entry.with_id(change_id);
        entries.push(committed.clone());
        Ok(AppendOutcome::Committed(committed))
    }

    async fn latest(&self, content_id: i64) -> Result<Option<ChangeLogEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(select_latest(entries.iter().filter(|e| e.content_id == content_id)).cloned())
    }

    async fn latest_all(&self) -> Result<Vec<ChangeLogEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(latest_per_content(entries.iter()))
    }

    async fn history(&self, content_id: i64) -> Result<Vec<ChangeLogEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut history: Vec<ChangeLogEntry> = entries
            .iter()
            .filter(|e| e.content_id == content_id)
            .cloned()
            .collect();
        history.sort_by_key(recency_key);
        Ok(history)
    }

    async fn run_entries(&self, run_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .filter(|e| e.detection_run_id == run_id)
            .cloned()
            .collect())
    }

    async fn run_ids(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let ids: BTreeSet<&str> = entries
            .iter()
            .map(|e| e.detection_run_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        Ok(ids.into_iter().map(str::to_string).collect())
    }

    async fn run_exists(&self, run_id: &str) -> Result<bool> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.iter().any(|e| e.detection_run_id == run_id))
    }

    async fn count(&self) -> Result<i64> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.len() as i64)
    }
}

/// In-memory content registry.
pub struct InMemoryRegistry {
    locations: RwLock<Vec<ContentLocation>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            locations: RwLock::new(Vec::new()),
        }
    }

    fn modify<F>(
        &self,
        content_id: i64,
        expected_version: i64,
        apply: F,
    ) -> EngineResult<ContentLocation>
    where
        F: FnOnce(&mut ContentLocation),
    {
        let mut locations = self.locations.write().map_err(poisoned)?;
        let location = locations
            .iter_mut()
            .find(|l| l.content_id == content_id)
            .ok_or(EngineError::UnknownContent { content_id })?;
        if location.version != expected_version {
            return Err(EngineError::VersionConflict {
                content_id,
                expected: expected_version,
                actual: location.version,
            });
        }
        apply(location);
        location.version += 1;
        location.updated_at = truncate_to_micros(Utc::now());
        Ok(location.clone())
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentRegistry for InMemoryRegistry {
    async fn register(&self, new: &NewContentLocation) -> EngineResult<ContentLocation> {
        let mut locations = self.locations.write().map_err(poisoned)?;
        if locations
            .iter()
            .any(|l| l.file_name == new.file_name && l.page_number == new.page_number)
        {
            return Err(EngineError::DuplicateLocation {
                file_name: new.file_name.clone(),
                page: new
                    .page_number
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            });
        }
        let now = truncate_to_micros(Utc::now());
        let location = ContentLocation {
            content_id: locations.len() as i64 + 1,
            file_name: new.file_name.clone(),
            page_number: new.page_number,
            metadata: new.metadata.clone(),
            status: ContentStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        locations.push(location.clone());
        Ok(location)
    }

    async fn get(&self, content_id: i64) -> EngineResult<Option<ContentLocation>> {
        let locations = self.locations.read().map_err(poisoned)?;
        Ok(locations.iter().find(|l| l.content_id == content_id).cloned())
    }

    async fn find(
        &self,
        file_name: &str,
        page_number: Option<i64>,
    ) -> EngineResult<Option<ContentLocation>> {
        let locations = self.locations.read().map_err(poisoned)?;
        Ok(locations
            .iter()
            .find(|l| l.file_name == file_name && l.page_number == page_number)
            .cloned())
    }

    async fn update_metadata(
        &self,
        content_id: i64,
        expected_version: i64,
        metadata: &ContentMetadata,
    ) -> EngineResult<ContentLocation> {
        self.modify(content_id, expected_version, |l| l.metadata = metadata.clone())
    }

    async fn set_status(
        &self,
        content_id: i64,
        expected_version: i64,
        status: ContentStatus,
    ) -> EngineResult<ContentLocation> {
        self.modify(content_id, expected_version, |l| l.status = status)
    }

    async fn list(&self) -> EngineResult<Vec<ContentLocation>> {
        let locations = self.locations.read().map_err(poisoned)?;
        Ok(locations.clone())
    }
}

/// FAQ store backed by a fixed `checksum → count` table.
#[derive(Default)]
pub struct StaticFaqStore {
    counts: RwLock<HashMap<Checksum, i64>>,
}

impl StaticFaqStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, checksum: Checksum, count: i64) {
        let mut counts = self.counts.write().unwrap_or_else(|e| e.into_inner());
        counts.insert(checksum, count);
    }
}

#[async_trait]
impl FaqStore for StaticFaqStore {
    async fn count_faqs(&self, checksum: &Checksum) -> Result<i64> {
        let counts = self.counts.read().map_err(poisoned)?;
        Ok(counts.get(checksum).copied().unwrap_or(0))
    }
}

/// FAQ store used when no FAQ backend is configured: every count is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaqStore;

#[async_trait]
impl FaqStore for NoFaqStore {
    async fn count_faqs(&self, _checksum: &Checksum) -> Result<i64> {
        Ok(0)
    }
}
