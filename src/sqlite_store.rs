//! SQLite-backed store implementations.
//!
//! [`SqliteStore`] implements all three storage seams of the core crate
//! ([`ChangeLog`], [`ContentRegistry`], [`FaqStore`]) over the schema
//! created by [`migrate`](crate::migrate). Timestamps are stored as unix
//! microseconds.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use content_sentinel_core::checksum::Checksum;
use content_sentinel_core::clock::truncate_to_micros;
use content_sentinel_core::error::{EngineError, EngineResult};
use content_sentinel_core::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, NewChangeLogEntry,
    NewContentLocation,
};
use content_sentinel_core::store::{AppendOutcome, ChangeLog, ContentRegistry, FaqStore};

const ENTRY_COLUMNS: &str = "change_id, content_id, content_checksum, previous_checksum, \
    file_name, page_number, requires_regeneration, change_type, metadata_json, detected_at, \
    source_modified_at, existing_faq_count, detection_run_id, since_date";

const LOCATION_COLUMNS: &str =
    "content_id, file_name, page_number, metadata_json, status, version, created_at, updated_at";

/// SQLite implementation of the store traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| anyhow!("timestamp out of range: {}", us))
}

fn parse_checksum(raw: &str) -> Result<Checksum> {
    Checksum::parse(raw).map_err(|e| anyhow!("stored checksum is corrupt: {}", e))
}

fn storage(err: sqlx::Error) -> EngineError {
    EngineError::Storage(err.into())
}

fn row_to_entry(row: &SqliteRow) -> Result<ChangeLogEntry> {
    let previous: Option<String> = row.get("previous_checksum");
    let metadata_json: String = row.get("metadata_json");
    let change_type: String = row.get("change_type");
    let since: Option<i64> = row.get("since_date");

    Ok(ChangeLogEntry {
        change_id: row.get("change_id"),
        content_id: row.get("content_id"),
        content_checksum: parse_checksum(row.get::<&str, _>("content_checksum"))?,
        previous_checksum: previous.as_deref().map(parse_checksum).transpose()?,
        file_name: row.get("file_name"),
        page_number: row.get("page_number"),
        requires_regeneration: row.get::<i64, _>("requires_regeneration") != 0,
        change_type: change_type.parse()?,
        metadata_snapshot: serde_json::from_str(&metadata_json)?,
        detected_at: from_micros(row.get("detected_at"))?,
        source_modified_at: from_micros(row.get("source_modified_at"))?,
        existing_faq_count: row.get("existing_faq_count"),
        detection_run_id: row.get("detection_run_id"),
        since_date: since.map(from_micros).transpose()?,
    })
}

fn row_to_location(row: &SqliteRow) -> Result<ContentLocation> {
    let metadata_json: String = row.get("metadata_json");
    let status: String = row.get("status");

    Ok(ContentLocation {
        content_id: row.get("content_id"),
        file_name: row.get("file_name"),
        page_number: row.get("page_number"),
        metadata: serde_json::from_str(&metadata_json)?,
        status: status.parse()?,
        version: row.get("version"),
        created_at: from_micros(row.get("created_at"))?,
        updated_at: from_micros(row.get("updated_at"))?,
    })
}

fn collect_entries(rows: &[SqliteRow]) -> Result<Vec<ChangeLogEntry>> {
    rows.iter().map(row_to_entry).collect()
}

#[async_trait]
impl ChangeLog for SqliteStore {
    async fn append(
        &self,
        entry: NewChangeLogEntry,
        expected_baseline: Option<i64>,
    ) -> Result<AppendOutcome> {
        let metadata_json = serde_json::to_string(&entry.metadata_snapshot)?;

        // Check and write in one statement: the row only lands if the
        // baseline is still the one the decision was made against.
        let result = sqlx::query(
            r#"
            INSERT INTO content_change_log (content_id, content_checksum, previous_checksum,
                file_name, page_number, requires_regeneration, change_type, metadata_json,
                detected_at, source_modified_at, existing_faq_count, detection_run_id, since_date)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE (
                SELECT change_id FROM content_change_log
                WHERE content_id = ?
                ORDER BY detected_at DESC, change_id DESC
                LIMIT 1
            ) IS ?
            "#,
        )
        .bind(entry.content_id)
        .bind(entry.content_checksum.as_str())
        .bind(entry.previous_checksum.as_ref().map(|c| c.as_str()))
        .bind(&entry.file_name)
        .bind(entry.page_number)
        .bind(entry.requires_regeneration as i64)
        .bind(entry.change_type.as_str())
        .bind(&metadata_json)
        .bind(entry.detected_at.timestamp_micros())
        .bind(entry.source_modified_at.timestamp_micros())
        .bind(entry.existing_faq_count)
        .bind(&entry.detection_run_id)
        .bind(entry.since_date.map(|d| d.timestamp_micros()))
        .bind(entry.content_id)
        .bind(expected_baseline)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(AppendOutcome::BaselineMoved);
        }

        let change_id = result.last_insert_rowid();
        let mut committed = entry.with_id(change_id);
        committed.detected_at = truncate_to_micros(committed.detected_at);
        committed.source_modified_at = truncate_to_micros(committed.source_modified_at);
        committed.since_date = committed.since_date.map(truncate_to_micros);
        Ok(AppendOutcome::Committed(committed))
    }

    async fn latest(&self, content_id: i64) -> Result<Option<ChangeLogEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_change_log WHERE content_id = ? \
             ORDER BY detected_at DESC, change_id DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn latest_all(&self) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {cols} FROM (
                SELECT {cols},
                       ROW_NUMBER() OVER (
                           PARTITION BY content_id
                           ORDER BY detected_at DESC, change_id DESC
                       ) AS rn
                FROM content_change_log
            )
            WHERE rn = 1
            ORDER BY content_id ASC
            "#,
            cols = ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        collect_entries(&rows)
    }

    async fn history(&self, content_id: i64) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_change_log WHERE content_id = ? \
             ORDER BY detected_at ASC, change_id ASC",
            ENTRY_COLUMNS
        ))
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;

        collect_entries(&rows)
    }

    async fn run_entries(&self, run_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_change_log WHERE detection_run_id = ? ORDER BY change_id ASC",
            ENTRY_COLUMNS
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        collect_entries(&rows)
    }

    async fn run_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT detection_run_id FROM content_change_log \
             WHERE detection_run_id != '' ORDER BY detection_run_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn run_exists(&self, run_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM content_change_log WHERE detection_run_id = ?)",
        )
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_change_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

impl SqliteStore {
    async fn fetch_location(&self, content_id: i64) -> EngineResult<Option<ContentLocation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_locations WHERE content_id = ?",
            LOCATION_COLUMNS
        ))
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.as_ref().map(row_to_location).transpose()?)
    }

    /// Resolve a zero-row optimistic update into the right error.
    async fn version_failure(&self, content_id: i64, expected_version: i64) -> EngineError {
        match self.fetch_location(content_id).await {
            Ok(Some(current)) => EngineError::VersionConflict {
                content_id,
                expected: expected_version,
                actual: current.version,
            },
            Ok(None) => EngineError::UnknownContent { content_id },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ContentRegistry for SqliteStore {
    async fn register(&self, new: &NewContentLocation) -> EngineResult<ContentLocation> {
        let now = Utc::now().timestamp_micros();
        let metadata_json = serde_json::to_string(&new.metadata).map_err(anyhow::Error::from)?;

        let result = sqlx::query(
            r#"
            INSERT INTO content_locations (file_name, page_number, metadata_json, status,
                                           version, created_at, updated_at)
            VALUES (?, ?, ?, 'active', 1, ?, ?)
            "#,
        )
        .bind(&new.file_name)
        .bind(new.page_number)
        .bind(&metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(EngineError::DuplicateLocation {
                    file_name: new.file_name.clone(),
                    page: new
                        .page_number
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                });
            }
            Err(e) => return Err(storage(e)),
        };

        let content_id = result.last_insert_rowid();
        self.fetch_location(content_id)
            .await?
            .ok_or(EngineError::UnknownContent { content_id })
    }

    async fn get(&self, content_id: i64) -> EngineResult<Option<ContentLocation>> {
        self.fetch_location(content_id).await
    }

    async fn find(
        &self,
        file_name: &str,
        page_number: Option<i64>,
    ) -> EngineResult<Option<ContentLocation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_locations WHERE file_name = ? AND page_number IS ?",
            LOCATION_COLUMNS
        ))
        .bind(file_name)
        .bind(page_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.as_ref().map(row_to_location).transpose()?)
    }

    async fn update_metadata(
        &self,
        content_id: i64,
        expected_version: i64,
        metadata: &ContentMetadata,
    ) -> EngineResult<ContentLocation> {
        let metadata_json = serde_json::to_string(metadata).map_err(anyhow::Error::from)?;
        let result = sqlx::query(
            r#"
            UPDATE content_locations
            SET metadata_json = ?, version = version + 1, updated_at = ?
            WHERE content_id = ? AND version = ?
            "#,
        )
        .bind(&metadata_json)
        .bind(Utc::now().timestamp_micros())
        .bind(content_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(self.version_failure(content_id, expected_version).await);
        }
        self.fetch_location(content_id)
            .await?
            .ok_or(EngineError::UnknownContent { content_id })
    }

    async fn set_status(
        &self,
        content_id: i64,
        expected_version: i64,
        status: ContentStatus,
    ) -> EngineResult<ContentLocation> {
        let result = sqlx::query(
            r#"
            UPDATE content_locations
            SET status = ?, version = version + 1, updated_at = ?
            WHERE content_id = ? AND version = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp_micros())
        .bind(content_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(self.version_failure(content_id, expected_version).await);
        }
        self.fetch_location(content_id)
            .await?
            .ok_or(EngineError::UnknownContent { content_id })
    }

    async fn list(&self) -> EngineResult<Vec<ContentLocation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_locations ORDER BY content_id ASC",
            LOCATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(row_to_location)
            .collect::<Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl FaqStore for SqliteStore {
    /// Active questions with at least one valid source on `checksum`. A
    /// question drawn from several pages counts once per checksum.
    async fn count_faqs(&self, checksum: &Checksum) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT s.question_id)
            FROM faq_question_sources s
            JOIN faq_questions q ON q.question_id = s.question_id
            WHERE s.content_checksum = ? AND s.is_valid = 1 AND q.status = 'active'
            "#,
        )
        .bind(checksum.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}
