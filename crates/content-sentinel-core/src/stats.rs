//! Detection run analytics.
//!
//! A run has no storage of its own; its statistics are an aggregate over
//! the change-log entries tagged with its id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::models::ChangeLogEntry;

/// Aggregate view of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub run_id: String,
    pub total_pages_analyzed: i64,
    pub pages_requiring_regeneration: i64,
    pub pages_not_requiring_regeneration: i64,
    /// Sum of `existing_faq_count` over the run.
    pub total_existing_faqs: i64,
    /// Sum of `existing_faq_count` over regeneration rows only.
    pub faqs_to_invalidate: i64,
    pub distinct_files: i64,
    pub distinct_checksums: i64,
    pub earliest_since_date: Option<DateTime<Utc>>,
    pub first_detected_at: Option<DateTime<Utc>>,
    pub last_detected_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn from_entries(run_id: &str, entries: &[ChangeLogEntry]) -> Self {
        let mut files: HashSet<&str> = HashSet::new();
        let mut checksums: HashSet<&str> = HashSet::new();
        let mut stats = RunStats {
            run_id: run_id.to_string(),
            total_pages_analyzed: 0,
            pages_requiring_regeneration: 0,
            pages_not_requiring_regeneration: 0,
            total_existing_faqs: 0,
            faqs_to_invalidate: 0,
            distinct_files: 0,
            distinct_checksums: 0,
            earliest_since_date: None,
            first_detected_at: None,
            last_detected_at: None,
        };

        for e in entries {
            stats.total_pages_analyzed += 1;
            stats.total_existing_faqs += e.existing_faq_count;
            if e.requires_regeneration {
                stats.pages_requiring_regeneration += 1;
                stats.faqs_to_invalidate += e.existing_faq_count;
            } else {
                stats.pages_not_requiring_regeneration += 1;
            }
            files.insert(&e.file_name);
            checksums.insert(e.content_checksum.as_str());
            stats.earliest_since_date = min_opt(stats.earliest_since_date, e.since_date);
            stats.first_detected_at = min_opt(stats.first_detected_at, Some(e.detected_at));
            stats.last_detected_at = stats.last_detected_at.max(Some(e.detected_at));
        }

        stats.distinct_files = files.len() as i64;
        stats.distinct_checksums = checksums.len() as i64;
        stats
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::models::{ChangeType, ContentMetadata};
    use chrono::{Duration, TimeZone};

    fn entry(
        id: i64,
        file: &str,
        fill: char,
        faqs: i64,
        regen: bool,
        since_days: Option<i64>,
    ) -> ChangeLogEntry {
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        ChangeLogEntry {
            change_id: id,
            content_id: id,
            content_checksum: Checksum::parse(&fill.to_string().repeat(64)).unwrap(),
            previous_checksum: None,
            file_name: file.to_string(),
            page_number: Some(id),
            requires_regeneration: regen,
            change_type: ChangeType::ModifiedContent,
            metadata_snapshot: ContentMetadata::default(),
            detected_at: base + Duration::seconds(id),
            source_modified_at: base,
            existing_faq_count: faqs,
            detection_run_id: "run".to_string(),
            since_date: since_days.map(|d| base - Duration::days(d)),
        }
    }

    #[test]
    fn test_aggregates_counts_and_sums() {
        let entries = vec![
            entry(1, "a.pdf", 'a', 3, true, Some(7)),
            entry(2, "a.pdf", 'b', 2, false, None),
            entry(3, "b.pdf", 'a', 4, true, Some(30)),
        ];
        let stats = RunStats::from_entries("run", &entries);
        assert_eq!(stats.total_pages_analyzed, 3);
        assert_eq!(stats.pages_requiring_regeneration, 2);
        assert_eq!(stats.pages_not_requiring_regeneration, 1);
        assert_eq!(stats.total_existing_faqs, 9);
        assert_eq!(stats.faqs_to_invalidate, 7);
        assert_eq!(stats.distinct_files, 2);
        assert_eq!(stats.distinct_checksums, 2);
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(stats.earliest_since_date, Some(base - Duration::days(30)));
        assert_eq!(stats.first_detected_at, Some(base + Duration::seconds(1)));
        assert_eq!(stats.last_detected_at, Some(base + Duration::seconds(3)));
        assert_eq!(
            stats.pages_requiring_regeneration + stats.pages_not_requiring_regeneration,
            stats.total_pages_analyzed
        );
    }

    #[test]
    fn test_empty_run() {
        let stats = RunStats::from_entries("empty", &[]);
        assert_eq!(stats.total_pages_analyzed, 0);
        assert!(stats.earliest_since_date.is_none());
        assert!(stats.first_detected_at.is_none());
    }
}
