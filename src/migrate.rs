//! Database schema migrations (idempotent).
//!
//! | Table | Owner |
//! |-------|-------|
//! | `content_locations` | registry (ingestion collaborator) |
//! | `content_change_log` | detector, append-only |
//! | `faq_questions`, `faq_answers` | FAQ pipeline |
//! | `faq_question_sources`, `faq_answer_sources` | FAQ pipeline; read here only for counts |
//!
//! The change log refuses `UPDATE` and `DELETE` through triggers, and every
//! checksum column carries a `length(...) = 64` check.
//!
//! A question or answer is tied to the content it was generated from
//! through its source rows, one per contributing checksum. A source stays
//! valid until a change invalidates it.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table, index and trigger on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_locations (
            content_id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,
            page_number INTEGER,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'active',
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // NULL pages are distinct in a plain UNIQUE constraint.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_locations_slot
        ON content_locations(file_name, COALESCE(page_number, -1))
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_change_log (
            change_id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id INTEGER NOT NULL,
            content_checksum TEXT NOT NULL CHECK (length(content_checksum) = 64),
            previous_checksum TEXT
                CHECK (previous_checksum IS NULL OR length(previous_checksum) = 64),
            file_name TEXT NOT NULL,
            page_number INTEGER,
            requires_regeneration INTEGER NOT NULL,
            change_type TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            detected_at INTEGER NOT NULL,
            source_modified_at INTEGER NOT NULL,
            existing_faq_count INTEGER NOT NULL DEFAULT 0,
            detection_run_id TEXT NOT NULL DEFAULT '',
            since_date INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_change_log_no_update
        BEFORE UPDATE ON content_change_log
        BEGIN
            SELECT RAISE(ABORT, 'content_change_log is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_change_log_no_delete
        BEFORE DELETE ON content_change_log
        BEGIN
            SELECT RAISE(ABORT, 'content_change_log is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faq_questions (
            question_id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            version INTEGER NOT NULL DEFAULT 1,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faq_answers (
            answer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL,
            answer_text TEXT NOT NULL,
            answer_format TEXT NOT NULL DEFAULT 'markdown',
            status TEXT NOT NULL DEFAULT 'active',
            version INTEGER NOT NULL DEFAULT 1,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (question_id) REFERENCES faq_questions(question_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faq_question_sources (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL REFERENCES faq_questions(question_id),
            content_checksum TEXT NOT NULL CHECK (length(content_checksum) = 64),
            is_primary_source INTEGER NOT NULL DEFAULT 0,
            contribution_weight REAL NOT NULL DEFAULT 1.0
                CHECK (contribution_weight >= 0.0 AND contribution_weight <= 1.0),
            is_valid INTEGER NOT NULL DEFAULT 1,
            valid_from INTEGER NOT NULL,
            valid_until INTEGER,
            invalidation_reason TEXT CHECK (invalidation_reason IS NULL OR invalidation_reason IN
                ('content_changed', 'content_deleted', 'quality_issue', 'manual',
                 'selective_impact')),
            invalidated_by_change_id INTEGER REFERENCES content_change_log(change_id),
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faq_answer_sources (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT,
            answer_id INTEGER NOT NULL REFERENCES faq_answers(answer_id),
            content_checksum TEXT NOT NULL CHECK (length(content_checksum) = 64),
            is_primary_source INTEGER NOT NULL DEFAULT 0,
            contribution_weight REAL NOT NULL DEFAULT 1.0
                CHECK (contribution_weight >= 0.0 AND contribution_weight <= 1.0),
            context_employed TEXT,
            is_valid INTEGER NOT NULL DEFAULT 1,
            valid_from INTEGER NOT NULL,
            valid_until INTEGER,
            invalidation_reason TEXT CHECK (invalidation_reason IS NULL OR invalidation_reason IN
                ('content_changed', 'content_deleted', 'quality_issue', 'manual',
                 'selective_impact')),
            invalidated_by_change_id INTEGER REFERENCES content_change_log(change_id),
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_change_log_baseline
        ON content_change_log(content_id, detected_at DESC, change_id DESC)
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_change_log_run ON content_change_log(detection_run_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_faq_question_sources_checksum
        ON faq_question_sources(content_checksum, is_valid)
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_faq_answer_sources_checksum
        ON faq_answer_sources(content_checksum, is_valid)
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_faq_answers_question ON faq_answers(question_id)")
        .execute(pool)
        .await?;

    Ok(())
}
