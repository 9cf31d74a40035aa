//! Detection run coordination.
//!
//! A run is a label, not a transaction. [`RunCoordinator::begin_run`] hands
//! out a sortable id, every detection tagged with it commits immediately,
//! and [`RunCoordinator::end_run`] aggregates whatever was committed. A run
//! that fails half-way keeps every entry it already wrote.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use content_sentinel_core::clock::Clock;
use content_sentinel_core::error::{EngineError, EngineResult};
use content_sentinel_core::models::{ChangeLogEntry, DetectRequest, RunTag};
use content_sentinel_core::stats::RunStats;
use content_sentinel_core::store::ChangeLog;

use crate::detector::ChangeDetector;

/// ISO-8601 UTC timestamp with microseconds, e.g. `2026-10-18T09:15:02.123456Z`.
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[derive(Default)]
struct RunBook {
    active: HashMap<String, RunTag>,
    finished: HashSet<String>,
}

pub struct RunCoordinator {
    detector: Arc<ChangeDetector>,
    log: Arc<dyn ChangeLog>,
    clock: Arc<dyn Clock>,
    book: Mutex<RunBook>,
}

impl RunCoordinator {
    pub fn new(
        detector: Arc<ChangeDetector>,
        log: Arc<dyn ChangeLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            detector,
            log,
            clock,
            book: Mutex::new(RunBook::default()),
        }
    }

    /// Start a run with a timestamp-derived id.
    pub async fn begin_run(&self, since: Option<DateTime<Utc>>) -> EngineResult<String> {
        let run_id = generate_run_id(self.clock.now());
        self.begin_run_with_id(run_id, since).await
    }

    /// Start a run with a caller-chosen id. Reusing any id that was ever
    /// active or that already labels entries is a fatal collision.
    pub async fn begin_run_with_id(
        &self,
        run_id: String,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<String> {
        // The empty id is reserved for ad-hoc detections.
        if run_id.is_empty() || self.log.run_exists(&run_id).await? {
            return Err(EngineError::RunIdCollision { run_id });
        }

        {
            let mut book = self.book();
            if book.active.contains_key(&run_id) || book.finished.contains(&run_id) {
                return Err(EngineError::RunIdCollision { run_id });
            }
            book.active.insert(
                run_id.clone(),
                RunTag {
                    run_id: run_id.clone(),
                    since,
                },
            );
        }

        info!(run_id = %run_id, since = ?since, "detection run started");
        Ok(run_id)
    }

    /// Tag of an active run, for entries written under it.
    pub fn active_tag(&self, run_id: &str) -> EngineResult<RunTag> {
        self.book()
            .active
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownRun {
                run_id: run_id.to_string(),
            })
    }

    /// Detect under an active run.
    pub async fn detect(
        &self,
        run_id: &str,
        request: DetectRequest,
    ) -> EngineResult<ChangeLogEntry> {
        let tag = self.active_tag(run_id)?;
        self.detector.detect(request, &tag).await
    }

    /// Close the run and aggregate its committed entries.
    pub async fn end_run(&self, run_id: &str) -> EngineResult<RunStats> {
        {
            let mut book = self.book();
            if book.active.remove(run_id).is_none() {
                return Err(EngineError::UnknownRun {
                    run_id: run_id.to_string(),
                });
            }
            book.finished.insert(run_id.to_string());
        }

        let entries = self.log.run_entries(run_id).await?;
        let stats = RunStats::from_entries(run_id, &entries);
        info!(
            run_id = %run_id,
            analyzed = stats.total_pages_analyzed,
            regenerate = stats.pages_requiring_regeneration,
            faqs_to_invalidate = stats.faqs_to_invalidate,
            "detection run finished"
        );
        Ok(stats)
    }

    /// Statistics for any run, active or past.
    pub async fn run_stats(&self, run_id: &str) -> EngineResult<RunStats> {
        let entries = self.log.run_entries(run_id).await?;
        if entries.is_empty() && !self.is_known(run_id) {
            return Err(EngineError::UnknownRun {
                run_id: run_id.to_string(),
            });
        }
        Ok(RunStats::from_entries(run_id, &entries))
    }

    /// Statistics for every run that labels at least one entry, oldest first.
    pub async fn list_runs(&self) -> EngineResult<Vec<RunStats>> {
        let mut all = Vec::new();
        for run_id in self.log.run_ids().await? {
            let entries = self.log.run_entries(&run_id).await?;
            all.push(RunStats::from_entries(&run_id, &entries));
        }
        Ok(all)
    }

    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.book().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn is_known(&self, run_id: &str) -> bool {
        let book = self.book();
        book.active.contains_key(run_id) || book.finished.contains(run_id)
    }

    fn book(&self) -> std::sync::MutexGuard<'_, RunBook> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use chrono::{Duration, TimeZone};
    use content_sentinel_core::clock::ManualClock;
    use content_sentinel_core::models::{ContentLocation, ContentMetadata, ContentStatus};
    use content_sentinel_core::store::memory::{InMemoryChangeLog, StaticFaqStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap()
    }

    fn coordinator() -> (Arc<ManualClock>, Arc<StaticFaqStore>, RunCoordinator) {
        let log = Arc::new(InMemoryChangeLog::new());
        let faqs = Arc::new(StaticFaqStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let detector = Arc::new(ChangeDetector::new(
            log.clone(),
            faqs.clone(),
            clock.clone(),
            &DetectionConfig::default(),
        ));
        (clock.clone(), faqs, RunCoordinator::new(detector, log, clock))
    }

    fn request(content_id: i64, file: &str, fill: char) -> DetectRequest {
        DetectRequest {
            location: ContentLocation {
                content_id,
                file_name: file.to_string(),
                page_number: Some(content_id),
                metadata: ContentMetadata::default(),
                status: ContentStatus::Active,
                version: 1,
                created_at: t0(),
                updated_at: t0(),
            },
            checksum: fill.to_string().repeat(64),
            source_modified_at: Some(t0()),
            metadata: None,
        }
    }

    #[test]
    fn test_run_id_format_is_sortable() {
        let id = generate_run_id(t0());
        assert_eq!(id, "2026-10-18T09:15:02.000000Z");
        let later = generate_run_id(t0() + Duration::microseconds(1));
        assert!(later > id);
    }

    #[tokio::test]
    async fn test_run_lifecycle_and_stats() {
        let (clock, faqs, runs) = coordinator();
        faqs.set(
            content_sentinel_core::Checksum::parse(&"a".repeat(64)).unwrap(),
            2,
        );

        let first = runs.begin_run(None).await.unwrap();
        runs.detect(&first, request(1, "a.pdf", 'a')).await.unwrap();
        runs.detect(&first, request(2, "a.pdf", 'b')).await.unwrap();
        runs.end_run(&first).await.unwrap();

        clock.advance(Duration::days(1));
        let since = t0() - Duration::days(30);
        let second = runs.begin_run(Some(since)).await.unwrap();
        assert!(second > first);
        runs.detect(&second, request(1, "a.pdf", 'c')).await.unwrap();
        runs.detect(&second, request(2, "a.pdf", 'b')).await.unwrap();
        runs.detect(&second, request(3, "b.pdf", 'b')).await.unwrap();
        let stats = runs.end_run(&second).await.unwrap();

        assert_eq!(stats.total_pages_analyzed, 3);
        assert_eq!(stats.pages_requiring_regeneration, 2);
        assert_eq!(stats.pages_not_requiring_regeneration, 1);
        assert_eq!(stats.total_existing_faqs, 2);
        assert_eq!(stats.faqs_to_invalidate, 2);
        assert_eq!(stats.distinct_files, 2);
        assert_eq!(stats.distinct_checksums, 2);
        assert_eq!(stats.earliest_since_date, Some(since));

        let listed = runs.list_runs().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].run_id, first);
        for s in listed {
            assert_eq!(
                s.pages_requiring_regeneration + s.pages_not_requiring_regeneration,
                s.total_pages_analyzed
            );
        }
    }

    #[tokio::test]
    async fn test_same_instant_run_ids_collide() {
        let (_clock, _faqs, runs) = coordinator();
        runs.begin_run(None).await.unwrap();
        let err = runs.begin_run(None).await.unwrap_err();
        assert!(matches!(err, EngineError::RunIdCollision { .. }));
    }

    #[tokio::test]
    async fn test_finished_run_id_cannot_be_reused() {
        let (_clock, _faqs, runs) = coordinator();
        let id = runs.begin_run_with_id("nightly-1".to_string(), None).await.unwrap();
        runs.end_run(&id).await.unwrap();
        let err = runs
            .begin_run_with_id("nightly-1".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RunIdCollision { .. }));
    }

    #[tokio::test]
    async fn test_empty_run_id_is_reserved() {
        let (_clock, _faqs, runs) = coordinator();
        let err = runs.begin_run_with_id(String::new(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::RunIdCollision { .. }));
    }

    #[tokio::test]
    async fn test_detect_requires_active_run() {
        let (_clock, _faqs, runs) = coordinator();
        let err = runs.detect("never-started", request(1, "a.pdf", 'a')).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRun { .. }));

        let id = runs.begin_run(None).await.unwrap();
        runs.end_run(&id).await.unwrap();
        let err = runs.detect(&id, request(1, "a.pdf", 'a')).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRun { .. }));
    }

    #[tokio::test]
    async fn test_rejected_item_keeps_committed_entries() {
        let (_clock, _faqs, runs) = coordinator();
        let id = runs.begin_run(None).await.unwrap();
        runs.detect(&id, request(1, "a.pdf", 'a')).await.unwrap();
        let mut bad = request(2, "a.pdf", 'a');
        bad.checksum = "not-a-digest".to_string();
        assert!(runs.detect(&id, bad).await.is_err());
        let stats = runs.end_run(&id).await.unwrap();
        assert_eq!(stats.total_pages_analyzed, 1);
    }

    #[tokio::test]
    async fn test_run_stats_unknown_run() {
        let (_clock, _faqs, runs) = coordinator();
        assert!(matches!(
            runs.run_stats("missing").await.unwrap_err(),
            EngineError::UnknownRun { .. }
        ));
        let id = runs.begin_run(None).await.unwrap();
        assert_eq!(runs.active_runs(), vec![id.clone()]);
        let empty = runs.run_stats(&id).await.unwrap();
        assert_eq!(empty.total_pages_analyzed, 0);
    }
}
