//! Checksum baseline projection over the change log.
//!
//! The baseline of a content id is its entry with the greatest
//! `(detected_at, change_id)` pair. `change_id` only ever grows, so the
//! pair is a total order even when two detections share a timestamp.
//!
//! [`BaselineIndex`] caches that projection per content id. The cache is
//! never a source of truth: every append made through the detector is fed
//! back with [`BaselineIndex::observe`], and any entry can be dropped with
//! [`BaselineIndex::invalidate`] to force a re-read from the log.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::models::ChangeLogEntry;
use crate::store::ChangeLog;

/// Sort key that defines "latest".
pub fn recency_key(entry: &ChangeLogEntry) -> (DateTime<Utc>, i64) {
    (entry.detected_at, entry.change_id)
}

/// Pick the latest entry out of `entries`.
pub fn select_latest<'a, I>(entries: I) -> Option<&'a ChangeLogEntry>
where
    I: IntoIterator<Item = &'a ChangeLogEntry>,
{
    entries.into_iter().max_by_key(|e| recency_key(e))
}

/// Reduce a full log to one baseline per content id, ascending by content id.
pub fn latest_per_content<'a, I>(entries: I) -> Vec<ChangeLogEntry>
where
    I: IntoIterator<Item = &'a ChangeLogEntry>,
{
    let mut latest: BTreeMap<i64, &ChangeLogEntry> = BTreeMap::new();
    for entry in entries {
        match latest.get(&entry.content_id) {
            Some(current) if recency_key(current) >= recency_key(entry) => {}
            _ => {
                latest.insert(entry.content_id, entry);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Cached `content_id → baseline` map backed by a [`ChangeLog`].
pub struct BaselineIndex {
    log: Arc<dyn ChangeLog>,
    // `Some(None)` caches "no entries yet".
    cache: RwLock<HashMap<i64, Option<ChangeLogEntry>>>,
}

impl BaselineIndex {
    pub fn new(log: Arc<dyn ChangeLog>) -> Self {
        Self {
            log,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Baseline for `content_id`, served from cache when possible.
    pub async fn latest(&self, content_id: i64) -> Result<Option<ChangeLogEntry>> {
        if let Some(hit) = self.read_cache().get(&content_id) {
            return Ok(hit.clone());
        }
        let fresh = self.log.latest(content_id).await?;
        let mut cache = self.write_cache();
        // An append may have been observed while we were reading the log.
        let newer = match (cache.get(&content_id), &fresh) {
            (Some(Some(cached)), Some(f)) if recency_key(cached) <= recency_key(f) => None,
            (Some(Some(cached)), _) => Some(cached.clone()),
            _ => None,
        };
        match newer {
            Some(cached) => Ok(Some(cached)),
            None => {
                cache.insert(content_id, fresh.clone());
                Ok(fresh)
            }
        }
    }

    /// Record an entry that was just appended. Older entries never replace newer ones.
    pub fn observe(&self, entry: &ChangeLogEntry) {
        let mut cache = self.write_cache();
        let replace = match cache.get(&entry.content_id) {
            Some(Some(current)) => recency_key(entry) > recency_key(current),
            _ => true,
        };
        if replace {
            cache.insert(entry.content_id, Some(entry.clone()));
        }
    }

    /// Forget the cached baseline so the next read goes to the log.
    pub fn invalidate(&self, content_id: i64) {
        self.write_cache().remove(&content_id);
    }

    /// Re-derive the whole projection from the log.
    pub async fn rebuild(&self) -> Result<usize> {
        let baselines = self.log.latest_all().await?;
        let mut cache = self.write_cache();
        cache.clear();
        for entry in baselines {
            cache.insert(entry.content_id, Some(entry));
        }
        Ok(cache.len())
    }

    /// Number of content ids currently cached.
    pub fn cached_len(&self) -> usize {
        self.read_cache().len()
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, Option<ChangeLogEntry>>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, Option<ChangeLogEntry>>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::models::{ChangeType, ContentMetadata, NewChangeLogEntry};
    use crate::store::memory::InMemoryChangeLog;
    use crate::store::AppendOutcome;
    use chrono::TimeZone;

    fn entry(change_id: i64, content_id: i64, secs: i64, fill: char) -> ChangeLogEntry {
        new_entry(content_id, secs, fill).with_id(change_id)
    }

    fn new_entry(content_id: i64, secs: i64, fill: char) -> NewChangeLogEntry {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        NewChangeLogEntry {
            content_id,
            content_checksum: Checksum::parse(&fill.to_string().repeat(64)).unwrap(),
            previous_checksum: None,
            file_name: "policy.pdf".to_string(),
            page_number: Some(1),
            requires_regeneration: true,
            change_type: ChangeType::NewContent,
            metadata_snapshot: ContentMetadata::default(),
            detected_at: at,
            source_modified_at: at,
            existing_faq_count: 0,
            detection_run_id: String::new(),
            since_date: None,
        }
    }

    #[test]
    fn test_latest_prefers_later_timestamp() {
        let entries = vec![entry(5, 1, 100, 'a'), entry(3, 1, 200, 'b')];
        let latest = select_latest(&entries).unwrap();
        assert_eq!(latest.change_id, 3);
    }

    #[test]
    fn test_timestamp_tie_broken_by_change_id() {
        let entries = vec![entry(7, 1, 100, 'a'), entry(9, 1, 100, 'b'), entry(8, 1, 100, 'c')];
        let latest = select_latest(&entries).unwrap();
        assert_eq!(latest.change_id, 9);
        assert_eq!(latest.content_checksum.as_str(), "b".repeat(64));
    }

    #[test]
    fn test_latest_per_content_keeps_one_per_id() {
        let entries = vec![
            entry(1, 2, 100, 'a'),
            entry(2, 1, 100, 'b'),
            entry(3, 2, 300, 'c'),
            entry(4, 1, 50, 'd'),
        ];
        let latest = latest_per_content(&entries);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].content_id, 1);
        assert_eq!(latest[0].change_id, 2);
        assert_eq!(latest[1].content_id, 2);
        assert_eq!(latest[1].change_id, 3);
    }

    #[tokio::test]
    async fn test_index_caches_and_observes_appends() {
        let log = Arc::new(InMemoryChangeLog::new());
        let index = BaselineIndex::new(log.clone());

        assert!(index.latest(1).await.unwrap().is_none());
        assert_eq!(index.cached_len(), 1);

        let committed = match log.append(new_entry(1, 100, 'a'), None).await.unwrap() {
            AppendOutcome::Committed(e) => e,
            AppendOutcome::BaselineMoved => panic!("unexpected conflict"),
        };
        index.observe(&committed);
        let latest = index.latest(1).await.unwrap().unwrap();
        assert_eq!(latest.change_id, committed.change_id);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let log = Arc::new(InMemoryChangeLog::new());
        let index = BaselineIndex::new(log.clone());
        assert!(index.latest(1).await.unwrap().is_none());

        // Appended behind the index's back (another writer).
        log.append(new_entry(1, 100, 'a'), None).await.unwrap();
        assert!(index.latest(1).await.unwrap().is_none());

        index.invalidate(1);
        assert!(index.latest(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rebuild_loads_every_baseline() {
        let log = Arc::new(InMemoryChangeLog::new());
        log.append(new_entry(1, 100, 'a'), None).await.unwrap();
        log.append(new_entry(2, 100, 'b'), None).await.unwrap();
        let index = BaselineIndex::new(log);
        assert_eq!(index.rebuild().await.unwrap(), 2);
    }

    #[test]
    fn test_observe_ignores_older_entry() {
        let log = Arc::new(InMemoryChangeLog::new());
        let index = BaselineIndex::new(log);
        index.observe(&entry(2, 1, 200, 'b'));
        index.observe(&entry(1, 1, 100, 'a'));
        let cached = index.read_cache().get(&1).cloned().flatten().unwrap();
        assert_eq!(cached.change_id, 2);
    }
}
