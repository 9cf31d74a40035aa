//! Database overview (`sentinel stats`).
//!
//! A quick summary of what the engine has recorded: registry size, change
//! log size, pending regenerations and the most recent run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM content_locations) AS locations,
            (SELECT COUNT(*) FROM content_locations WHERE status = 'active') AS active,
            (SELECT COUNT(*) FROM content_change_log) AS entries,
            (SELECT COUNT(DISTINCT detection_run_id) FROM content_change_log
                WHERE detection_run_id <> '') AS runs,
            (SELECT MAX(detection_run_id) FROM content_change_log
                WHERE detection_run_id <> '') AS last_run,
            (SELECT MAX(detected_at) FROM content_change_log) AS last_detected
        "#,
    )
    .fetch_one(&pool)
    .await?;

    // Baselines of active locations still flagged for regeneration.
    let pending: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM (
            SELECT content_id, requires_regeneration,
                   ROW_NUMBER() OVER (PARTITION BY content_id
                                      ORDER BY detected_at DESC, change_id DESC) AS rn
            FROM content_change_log
        ) b
        JOIN content_locations l ON l.content_id = b.content_id
        WHERE b.rn = 1 AND b.requires_regeneration = 1 AND l.status = 'active'
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let faqs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM faq_questions WHERE status = 'active'")
            .fetch_one(&pool)
            .await?;

    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let locations: i64 = row.get("locations");
    let active: i64 = row.get("active");
    let entries: i64 = row.get("entries");
    let runs: i64 = row.get("runs");
    let last_run: Option<String> = row.get("last_run");
    let last_detected: Option<i64> = row.get("last_detected");

    println!("Content Sentinel: Database Stats");
    println!("================================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Locations:     {} ({} active)", locations, active);
    println!("  Log entries:   {}", entries);
    println!("  Pending regen: {}", pending);
    println!("  Active FAQs:   {}", faqs);
    println!("  Runs:          {}", runs);
    println!(
        "  Last run:      {}",
        last_run.as_deref().unwrap_or("never")
    );
    println!(
        "  Last detected: {}",
        last_detected
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Relative time for recent instants ("3 hours ago"), absolute otherwise.
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return format_ts(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        assert_eq!(format_ts_relative(Utc::now()), "just now");
        assert_eq!(format_ts_relative(Utc::now() - Duration::hours(3)), "3 hours ago");
        assert_eq!(format_ts_relative(Utc::now() - Duration::days(1)), "1 day ago");
    }
}
