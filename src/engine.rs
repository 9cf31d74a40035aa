//! Engine assembly.
//!
//! [`Engine`] wires the registry, change log, FAQ store, detector and run
//! coordinator together. The CLI commands and the HTTP server both go
//! through it, so every entry point applies the same validation and the
//! same per-content-id locking.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use content_sentinel_core::clock::{Clock, SystemClock};
use content_sentinel_core::error::{EngineError, EngineResult};
use content_sentinel_core::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, DetectRequest,
    NewContentLocation, RunTag,
};
use content_sentinel_core::queue::{QueueLimit, QueueSnapshot};
use content_sentinel_core::store::{ChangeLog, ContentRegistry, FaqStore};

use crate::config::Config;
use crate::coordinator::RunCoordinator;
use crate::db;
use crate::detector::ChangeDetector;
use crate::faq::build_faq_store;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// A detection for a registered content id. The location is resolved from
/// the registry.
#[derive(Debug, Clone)]
pub struct DetectInput {
    pub content_id: i64,
    pub checksum: String,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub metadata: Option<ContentMetadata>,
}

pub struct Engine {
    config: Arc<Config>,
    registry: Arc<dyn ContentRegistry>,
    log: Arc<dyn ChangeLog>,
    detector: Arc<ChangeDetector>,
    runs: Arc<RunCoordinator>,
    clock: Arc<dyn Clock>,
    pool: Option<SqlitePool>,
}

impl Engine {
    /// Open the configured database, apply migrations and build the engine
    /// on the SQLite backend.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store = SqliteStore::new(pool.clone());
        let faqs = build_faq_store(config, &store)?;
        let store = Arc::new(store);

        let mut engine = Self::from_parts(
            config.clone(),
            store.clone(),
            store,
            faqs,
            Arc::new(SystemClock),
        );
        engine.pool = Some(pool);
        Ok(engine)
    }

    /// Build an engine over arbitrary backends.
    pub fn from_parts(
        config: Config,
        registry: Arc<dyn ContentRegistry>,
        log: Arc<dyn ChangeLog>,
        faqs: Arc<dyn FaqStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = Arc::new(ChangeDetector::new(
            log.clone(),
            faqs,
            clock.clone(),
            &config.detection,
        ));
        let runs = Arc::new(RunCoordinator::new(
            detector.clone(),
            log.clone(),
            clock.clone(),
        ));
        Self {
            config: Arc::new(config),
            registry,
            log,
            detector,
            runs,
            clock,
            pool: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runs(&self) -> &RunCoordinator {
        &self.runs
    }

    // ---- registry ----

    pub async fn register(&self, new: &NewContentLocation) -> EngineResult<ContentLocation> {
        self.registry.register(new).await
    }

    /// Return the location for `(file_name, page_number)`, registering it
    /// when unseen.
    pub async fn ensure_location(
        &self,
        new: &NewContentLocation,
    ) -> EngineResult<ContentLocation> {
        match self.registry.find(&new.file_name, new.page_number).await? {
            Some(existing) => Ok(existing),
            None => self.registry.register(new).await,
        }
    }

    pub async fn location(&self, content_id: i64) -> EngineResult<ContentLocation> {
        self.registry
            .get(content_id)
            .await?
            .ok_or(EngineError::UnknownContent { content_id })
    }

    pub async fn locations(&self) -> EngineResult<Vec<ContentLocation>> {
        self.registry.list().await
    }

    pub async fn update_metadata(
        &self,
        content_id: i64,
        expected_version: i64,
        metadata: &ContentMetadata,
    ) -> EngineResult<ContentLocation> {
        self.registry
            .update_metadata(content_id, expected_version, metadata)
            .await
    }

    /// Change the lifecycle status. Moving to `deleted` also appends a
    /// `deleted_content` entry outside of any run.
    pub async fn set_status(
        &self,
        content_id: i64,
        expected_version: i64,
        status: ContentStatus,
    ) -> EngineResult<ContentLocation> {
        let updated = self
            .registry
            .set_status(content_id, expected_version, status)
            .await?;
        if status == ContentStatus::Deleted {
            self.detector.record_deletion(&updated, &RunTag::ad_hoc()).await?;
        }
        Ok(updated)
    }

    /// Mark a location deleted under an active run.
    pub async fn delete_in_run(
        &self,
        run_id: &str,
        location: &ContentLocation,
    ) -> EngineResult<Option<ChangeLogEntry>> {
        let tag = self.runs.active_tag(run_id)?;
        let updated = self
            .registry
            .set_status(location.content_id, location.version, ContentStatus::Deleted)
            .await?;
        self.detector.record_deletion(&updated, &tag).await
    }

    // ---- detection ----

    /// Detect outside of any run. The entry's run id is empty.
    pub async fn detect_ad_hoc(&self, input: DetectInput) -> EngineResult<ChangeLogEntry> {
        let request = self.resolve(input).await?;
        self.detector.detect(request, &RunTag::ad_hoc()).await
    }

    /// Detect under an active run started with [`RunCoordinator::begin_run`].
    pub async fn detect_in_run(
        &self,
        run_id: &str,
        input: DetectInput,
    ) -> EngineResult<ChangeLogEntry> {
        let request = self.resolve(input).await?;
        self.runs.detect(run_id, request).await
    }

    async fn resolve(&self, input: DetectInput) -> EngineResult<DetectRequest> {
        let location = self.location(input.content_id).await?;
        Ok(DetectRequest {
            location,
            checksum: input.checksum,
            source_modified_at: input.source_modified_at,
            metadata: input.metadata,
        })
    }

    // ---- reads ----

    /// Regeneration queue over active locations. Never writes.
    pub async fn queue(&self, limit: QueueLimit) -> EngineResult<QueueSnapshot> {
        let active: HashSet<i64> = self
            .registry
            .list()
            .await?
            .into_iter()
            .filter(|l| l.status == ContentStatus::Active)
            .map(|l| l.content_id)
            .collect();
        let baselines = self
            .log
            .latest_all()
            .await?
            .into_iter()
            .filter(|e| active.contains(&e.content_id));
        let limit = limit.resolve(self.config.queue.default_limit);
        Ok(QueueSnapshot::build(baselines, self.clock.now(), limit))
    }

    /// Current baseline, read from the log rather than the detector cache.
    pub async fn baseline(&self, content_id: i64) -> EngineResult<Option<ChangeLogEntry>> {
        Ok(self.log.latest(content_id).await?)
    }

    /// Every entry for `content_id`, oldest first.
    pub async fn history(&self, content_id: i64) -> EngineResult<Vec<ChangeLogEntry>> {
        Ok(self.log.history(content_id).await?)
    }

    /// Release the database pool, if any.
    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use content_sentinel_core::clock::ManualClock;
    use content_sentinel_core::models::ChangeType;
    use content_sentinel_core::store::memory::{
        InMemoryChangeLog, InMemoryRegistry, StaticFaqStore,
    };
    use content_sentinel_core::Checksum;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    fn memory_engine() -> (Arc<ManualClock>, Arc<StaticFaqStore>, Engine) {
        let clock = Arc::new(ManualClock::new(t0()));
        let faqs = Arc::new(StaticFaqStore::new());
        let engine = Engine::from_parts(
            Config::with_db_path(":memory:"),
            Arc::new(InMemoryRegistry::new()),
            Arc::new(InMemoryChangeLog::new()),
            faqs.clone(),
            clock.clone(),
        );
        (clock, faqs, engine)
    }

    fn page(file: &str, page: i64) -> NewContentLocation {
        NewContentLocation {
            file_name: file.to_string(),
            page_number: Some(page),
            metadata: ContentMetadata::default(),
        }
    }

    fn input(content_id: i64, fill: char, modified: DateTime<Utc>) -> DetectInput {
        DetectInput {
            content_id,
            checksum: fill.to_string().repeat(64),
            source_modified_at: Some(modified),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_detect_unknown_content() {
        let (_clock, _faqs, engine) = memory_engine();
        let err = engine.detect_ad_hoc(input(42, 'a', t0())).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownContent { content_id: 42 }));
    }

    #[tokio::test]
    async fn test_ensure_location_is_idempotent() {
        let (_clock, _faqs, engine) = memory_engine();
        let a = engine.ensure_location(&page("guide.pdf", 1)).await.unwrap();
        let b = engine.ensure_location(&page("guide.pdf", 1)).await.unwrap();
        assert_eq!(a.content_id, b.content_id);
        assert_eq!(engine.locations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_scores_faq_impact_over_age() {
        let (clock, faqs, engine) = memory_engine();
        let busy = engine.register(&page("benefits.pdf", 1)).await.unwrap();
        let stale = engine.register(&page("benefits.pdf", 2)).await.unwrap();

        faqs.set(Checksum::parse(&"a".repeat(64)).unwrap(), 3);
        engine
            .detect_ad_hoc(input(busy.content_id, 'a', t0()))
            .await
            .unwrap();
        engine
            .detect_ad_hoc(input(stale.content_id, 'c', t0() - Duration::days(400)))
            .await
            .unwrap();

        clock.advance(Duration::days(10));
        let changed = engine
            .detect_ad_hoc(input(busy.content_id, 'b', t0()))
            .await
            .unwrap();
        assert_eq!(changed.change_type, ChangeType::ModifiedContent);
        assert_eq!(changed.existing_faq_count, 3);

        let queue = engine.queue(QueueLimit::Default).await.unwrap().items;
        assert_eq!(queue.len(), 2);
        // 400 days old, no FAQs: 400 beats 3 * 100 + 10.
        assert_eq!(queue[0].content_id, stale.content_id);
        assert_eq!(queue[0].priority_score, 410);
        assert_eq!(queue[1].content_id, busy.content_id);
        assert_eq!(queue[1].priority_score, 310);
    }

    #[tokio::test]
    async fn test_queue_drops_superseded_flags() {
        let (clock, _faqs, engine) = memory_engine();
        let loc = engine.register(&page("a.pdf", 1)).await.unwrap();
        engine.detect_ad_hoc(input(loc.content_id, 'a', t0())).await.unwrap();
        assert_eq!(engine.queue(QueueLimit::Default).await.unwrap().total, 1);

        clock.advance(Duration::hours(1));
        engine.detect_ad_hoc(input(loc.content_id, 'a', t0())).await.unwrap();
        assert!(engine.queue(QueueLimit::Default).await.unwrap().items.is_empty());
        assert_eq!(engine.history(loc.content_id).await.unwrap().len(), 2);
        let baseline = engine.baseline(loc.content_id).await.unwrap().unwrap();
        assert!(!baseline.requires_regeneration);
    }

    #[tokio::test]
    async fn test_queue_respects_default_limit() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut config = Config::with_db_path(":memory:");
        config.queue.default_limit = 2;
        let engine = Engine::from_parts(
            config,
            Arc::new(InMemoryRegistry::new()),
            Arc::new(InMemoryChangeLog::new()),
            Arc::new(StaticFaqStore::new()),
            clock,
        );
        for p in 1..=4 {
            let loc = engine.register(&page("big.pdf", p)).await.unwrap();
            engine.detect_ad_hoc(input(loc.content_id, 'f', t0())).await.unwrap();
        }
        let capped = engine.queue(QueueLimit::Default).await.unwrap();
        assert_eq!(capped.items.len(), 2);
        assert_eq!(capped.total, 4);
        assert!(capped.truncated);
        assert_eq!(engine.queue(QueueLimit::At(3)).await.unwrap().items.len(), 3);

        let all = engine.queue(QueueLimit::All).await.unwrap();
        assert_eq!(all.items.len(), 4);
        assert!(!all.truncated);
        assert_eq!(all.items[3].rank, 4);
    }

    #[tokio::test]
    async fn test_deleted_content_leaves_queue_and_rejects_detection() {
        let (clock, _faqs, engine) = memory_engine();
        let loc = engine.register(&page("retired.pdf", 1)).await.unwrap();
        engine.detect_ad_hoc(input(loc.content_id, 'a', t0())).await.unwrap();
        assert_eq!(engine.queue(QueueLimit::Default).await.unwrap().total, 1);

        clock.advance(Duration::hours(1));
        let deleted = engine
            .set_status(loc.content_id, loc.version, ContentStatus::Deleted)
            .await
            .unwrap();
        assert_eq!(deleted.status, ContentStatus::Deleted);
        assert_eq!(engine.queue(QueueLimit::All).await.unwrap().total, 0);

        let err = engine
            .detect_ad_hoc(input(loc.content_id, 'b', t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InactiveContent { .. }));

        let history = engine.history(loc.content_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].change_type, ChangeType::DeletedContent);
        assert_eq!(history[1].detection_run_id, "");
    }

    #[tokio::test]
    async fn test_archived_content_is_hidden_from_queue() {
        let (_clock, _faqs, engine) = memory_engine();
        let loc = engine.register(&page("old.pdf", 1)).await.unwrap();
        engine.detect_ad_hoc(input(loc.content_id, 'a', t0())).await.unwrap();
        engine
            .set_status(loc.content_id, loc.version, ContentStatus::Archived)
            .await
            .unwrap();
        assert_eq!(engine.queue(QueueLimit::All).await.unwrap().total, 0);
        assert_eq!(engine.history(loc.content_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_in_run_tags_the_entry() {
        let (_clock, _faqs, engine) = memory_engine();
        let loc = engine.register(&page("gone.pdf", 1)).await.unwrap();
        engine.detect_ad_hoc(input(loc.content_id, 'a', t0())).await.unwrap();

        let run_id = engine.runs().begin_run(None).await.unwrap();
        let entry = engine.delete_in_run(&run_id, &loc).await.unwrap().unwrap();
        assert_eq!(entry.detection_run_id, run_id);
        let stats = engine.runs().end_run(&run_id).await.unwrap();
        assert_eq!(stats.total_pages_analyzed, 1);
        assert_eq!(stats.pages_requiring_regeneration, 0);

        let err = engine.delete_in_run("not-running", &loc).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRun { .. }));
    }

    #[tokio::test]
    async fn test_detect_in_run_resolves_location() {
        let (_clock, _faqs, engine) = memory_engine();
        let loc = engine.register(&page("a.pdf", 1)).await.unwrap();
        let run_id = engine.runs().begin_run(None).await.unwrap();
        let e = engine
            .detect_in_run(&run_id, input(loc.content_id, 'a', t0()))
            .await
            .unwrap();
        assert_eq!(e.file_name, "a.pdf");
        assert_eq!(e.detection_run_id, run_id);
    }
}
