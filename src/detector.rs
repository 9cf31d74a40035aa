//! The change detector: the only writer of the change log.
//!
//! For one content location and a freshly computed checksum, the detector
//!
//! 1. validates the inputs (64-hex checksum, modification timestamp),
//! 2. takes the per-content-id lock,
//! 3. reads the baseline from the [`BaselineIndex`],
//! 4. decides `requires_regeneration` by exact checksum equality,
//! 5. asks the FAQ store how many FAQs hang off the *previous* checksum,
//! 6. appends one entry, conditional on the baseline not having moved.
//!
//! Archived and deleted locations are rejected, and a rejected input writes
//! nothing. A deletion is itself an entry
//! ([`ChangeDetector::record_deletion`]) and goes through the same lock and
//! conditional append. If another process appends for the same content id
//! between steps 3 and 6, the cached baseline is dropped and the decision is
//! made again, up to `max_append_attempts` times.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use content_sentinel_core::baseline::BaselineIndex;
use content_sentinel_core::checksum::Checksum;
use content_sentinel_core::clock::{truncate_to_micros, Clock};
use content_sentinel_core::error::{EngineError, EngineResult};
use content_sentinel_core::models::{
    ChangeLogEntry, ChangeType, ContentLocation, ContentStatus, DetectRequest, NewChangeLogEntry,
    RunTag,
};
use content_sentinel_core::store::{AppendOutcome, ChangeLog, FaqStore};

use crate::config::DetectionConfig;
use crate::locks::KeyedLocks;

/// Classify a new checksum against the current baseline. Content that
/// reappears after a deletion counts as new.
pub fn decide(baseline: Option<&ChangeLogEntry>, checksum: &Checksum) -> ChangeType {
    match baseline {
        None => ChangeType::NewContent,
        Some(b) if b.change_type == ChangeType::DeletedContent => ChangeType::NewContent,
        Some(b) if b.content_checksum == *checksum => ChangeType::UnchangedContent,
        Some(_) => ChangeType::ModifiedContent,
    }
}

pub struct ChangeDetector {
    log: Arc<dyn ChangeLog>,
    index: Arc<BaselineIndex>,
    faqs: Arc<dyn FaqStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    faq_timeout: Duration,
    max_attempts: u32,
}

impl ChangeDetector {
    pub fn new(
        log: Arc<dyn ChangeLog>,
        faqs: Arc<dyn FaqStore>,
        clock: Arc<dyn Clock>,
        settings: &DetectionConfig,
    ) -> Self {
        Self {
            index: Arc::new(BaselineIndex::new(log.clone())),
            log,
            faqs,
            clock,
            locks: KeyedLocks::new(),
            faq_timeout: settings.faq_timeout(),
            max_attempts: settings.max_append_attempts.max(1),
        }
    }

    pub fn baseline_index(&self) -> &Arc<BaselineIndex> {
        &self.index
    }

    /// Run one detection and append its entry.
    pub async fn detect(
        &self,
        request: DetectRequest,
        run: &RunTag,
    ) -> EngineResult<ChangeLogEntry> {
        let content_id = request.location.content_id;
        let checksum = Checksum::parse(&request.checksum).map_err(|reason| {
            EngineError::InvalidChecksumFormat { content_id, reason }
        })?;
        let source_modified_at = request
            .source_modified_at
            .map(truncate_to_micros)
            .ok_or(EngineError::MissingModificationTimestamp { content_id })?;
        if request.location.status != ContentStatus::Active {
            return Err(EngineError::InactiveContent {
                content_id,
                status: request.location.status,
            });
        }
        let metadata = request
            .metadata
            .unwrap_or_else(|| request.location.metadata.clone());

        let _guard = self.locks.lock(content_id).await;

        for attempt in 1..=self.max_attempts {
            let baseline = self.index.latest(content_id).await?;
            let change_type = decide(baseline.as_ref(), &checksum);

            let existing_faq_count = match &baseline {
                Some(b) => self.previous_faq_count(content_id, &b.content_checksum).await,
                None => 0,
            };

            let entry = NewChangeLogEntry {
                content_id,
                content_checksum: checksum.clone(),
                previous_checksum: baseline.as_ref().map(|b| b.content_checksum.clone()),
                file_name: request.location.file_name.clone(),
                page_number: request.location.page_number,
                requires_regeneration: change_type.requires_regeneration(),
                change_type,
                metadata_snapshot: metadata.clone(),
                detected_at: self.stamp(baseline.as_ref()),
                source_modified_at,
                existing_faq_count,
                detection_run_id: run.run_id.clone(),
                since_date: run.since.map(truncate_to_micros),
            };

            let expected = baseline.as_ref().map(|b| b.change_id);
            if let Some(committed) = self.try_commit(entry, expected, attempt).await? {
                debug!(
                    content_id,
                    change_id = committed.change_id,
                    change_type = %committed.change_type,
                    existing_faq_count,
                    run_id = %run.run_id,
                    "detection recorded"
                );
                return Ok(committed);
            }
        }

        Err(EngineError::BaselineContention {
            content_id,
            attempts: self.max_attempts,
        })
    }

    /// Append a `deleted_content` entry for `location`.
    ///
    /// The entry repeats the last known checksum and never requires
    /// regeneration, so it drops the location out of the queue. Returns
    /// `None` when there is nothing to supersede: the location was never
    /// detected, or its baseline already records the deletion.
    pub async fn record_deletion(
        &self,
        location: &ContentLocation,
        run: &RunTag,
    ) -> EngineResult<Option<ChangeLogEntry>> {
        let content_id = location.content_id;
        let _guard = self.locks.lock(content_id).await;

        for attempt in 1..=self.max_attempts {
            let baseline = match self.index.latest(content_id).await? {
                Some(b) if b.change_type != ChangeType::DeletedContent => b,
                _ => return Ok(None),
            };
            let existing_faq_count = self
                .previous_faq_count(content_id, &baseline.content_checksum)
                .await;
            let detected_at = self.stamp(Some(&baseline));

            let entry = NewChangeLogEntry {
                content_id,
                content_checksum: baseline.content_checksum.clone(),
                previous_checksum: Some(baseline.content_checksum.clone()),
                file_name: location.file_name.clone(),
                page_number: location.page_number,
                requires_regeneration: false,
                change_type: ChangeType::DeletedContent,
                metadata_snapshot: location.metadata.clone(),
                detected_at,
                source_modified_at: detected_at,
                existing_faq_count,
                detection_run_id: run.run_id.clone(),
                since_date: run.since.map(truncate_to_micros),
            };

            if let Some(committed) = self
                .try_commit(entry, Some(baseline.change_id), attempt)
                .await?
            {
                info!(
                    content_id,
                    change_id = committed.change_id,
                    existing_faq_count,
                    run_id = %run.run_id,
                    "deletion recorded"
                );
                return Ok(Some(committed));
            }
        }

        Err(EngineError::BaselineContention {
            content_id,
            attempts: self.max_attempts,
        })
    }

    /// Detection time, never earlier than the baseline it supersedes, or
    /// the new entry would not become the baseline.
    fn stamp(&self, baseline: Option<&ChangeLogEntry>) -> DateTime<Utc> {
        let now = truncate_to_micros(self.clock.now());
        match baseline {
            Some(b) if b.detected_at > now => b.detected_at,
            _ => now,
        }
    }

    /// Conditional append. `None` means another writer moved the baseline;
    /// the cached baseline is dropped so the caller can decide again.
    async fn try_commit(
        &self,
        entry: NewChangeLogEntry,
        expected_baseline: Option<i64>,
        attempt: u32,
    ) -> EngineResult<Option<ChangeLogEntry>> {
        let content_id = entry.content_id;
        match self.log.append(entry, expected_baseline).await? {
            AppendOutcome::Committed(committed) => {
                self.index.observe(&committed);
                Ok(Some(committed))
            }
            AppendOutcome::BaselineMoved => {
                debug!(content_id, attempt, "baseline moved during detection, retrying");
                self.index.invalidate(content_id);
                Ok(None)
            }
        }
    }

    /// FAQ count for the superseded checksum. Any failure degrades to zero.
    async fn previous_faq_count(&self, content_id: i64, previous: &Checksum) -> i64 {
        let lookup = self.faqs.count_faqs(previous);
        let reason = match tokio::time::timeout(self.faq_timeout, lookup).await {
            Ok(Ok(count)) => return count,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {} ms", self.faq_timeout.as_millis()),
        };
        let err = EngineError::FaqStoreUnavailable {
            checksum: previous.to_string(),
            reason,
        };
        warn!(content_id, error = %err, "using existing_faq_count = 0");
        0
    }
}
