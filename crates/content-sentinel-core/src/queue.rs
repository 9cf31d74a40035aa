//! Regeneration queue ordering.
//!
//! The queue is a pure projection of the change log: take every current
//! baseline, keep the ones that require regeneration, score them, and sort.
//!
//! # Priority
//!
//! `score = existing_faq_count × 100 + days_since(source_modified_at)`
//!
//! Sorted by score (desc), then `detected_at` (desc), then `change_id`
//! (desc). The last key makes the order total.
//!
//! A [`QueueSnapshot`] reports how many items need regeneration in total,
//! so a caller that asked for a limited page can tell it was cut short.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use crate::checksum::Checksum;
use crate::models::{ChangeLogEntry, ChangeType, ContentMetadata};

/// Weight of one dependent FAQ, in days of staleness.
pub const FAQ_IMPACT_WEIGHT: i64 = 100;

/// One actionable item for the FAQ generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    /// 1-based position in the queue.
    pub rank: usize,
    pub content_id: i64,
    pub change_id: i64,
    pub file_name: String,
    pub page_number: Option<i64>,
    pub content_checksum: Checksum,
    pub previous_checksum: Option<Checksum>,
    pub change_type: ChangeType,
    pub existing_faq_count: i64,
    pub days_since_modified: i64,
    pub priority_score: i64,
    pub detected_at: DateTime<Utc>,
    pub source_modified_at: DateTime<Utc>,
    pub detection_run_id: String,
    pub metadata: ContentMetadata,
}

/// How many items a queue request returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueLimit {
    /// `[queue].default_limit`.
    #[default]
    Default,
    At(usize),
    All,
}

impl QueueLimit {
    pub fn resolve(self, default_limit: usize) -> Option<usize> {
        match self {
            QueueLimit::Default => Some(default_limit),
            QueueLimit::At(n) => Some(n),
            QueueLimit::All => None,
        }
    }
}

/// The queue as seen at `generated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Items requiring regeneration before the limit was applied.
    pub total: usize,
    pub truncated: bool,
    pub items: Vec<QueueItem>,
}

impl QueueSnapshot {
    pub fn build<I>(baselines: I, now: DateTime<Utc>, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = ChangeLogEntry>,
    {
        let mut items = build_queue(baselines, now, None);
        let total = items.len();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        QueueSnapshot {
            generated_at: now,
            total,
            truncated: items.len() < total,
            items,
        }
    }
}

/// Whole days between `modified` and `now`, never negative.
pub fn days_since(modified: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - modified).num_days().max(0)
}

pub fn priority_score(existing_faq_count: i64, days_since_modified: i64) -> i64 {
    existing_faq_count
        .saturating_mul(FAQ_IMPACT_WEIGHT)
        .saturating_add(days_since_modified)
}

/// Queue order: higher score first, then fresher detection, then higher change id.
pub fn queue_order(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.priority_score
        .cmp(&a.priority_score)
        .then_with(|| b.detected_at.cmp(&a.detected_at))
        .then_with(|| b.change_id.cmp(&a.change_id))
}

/// Build the queue from a set of baselines (one entry per content id).
pub fn build_queue<I>(baselines: I, now: DateTime<Utc>, limit: Option<usize>) -> Vec<QueueItem>
where
    I: IntoIterator<Item = ChangeLogEntry>,
{
    let mut items: Vec<QueueItem> = baselines
        .into_iter()
        .filter(|e| e.requires_regeneration)
        .map(|e| {
            let days = days_since(e.source_modified_at, now);
            QueueItem {
                rank: 0,
                content_id: e.content_id,
                change_id: e.change_id,
                file_name: e.file_name,
                page_number: e.page_number,
                content_checksum: e.content_checksum,
                previous_checksum: e.previous_checksum,
                change_type: e.change_type,
                existing_faq_count: e.existing_faq_count,
                days_since_modified: days,
                priority_score: priority_score(e.existing_faq_count, days),
                detected_at: e.detected_at,
                source_modified_at: e.source_modified_at,
                detection_run_id: e.detection_run_id,
                metadata: e.metadata_snapshot,
            }
        })
        .collect();

    items.sort_by(queue_order);
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    for (i, item) in items.iter_mut().enumerate() {
        item.rank = i + 1;
    }
    items
}
