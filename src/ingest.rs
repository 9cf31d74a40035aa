//! Batch detection runs.
//!
//! A batch is a list of detection items processed under one run id. Items
//! reference either a registered `content_id` or a `(file_name,
//! page_number)` slot that is registered on first sight. Rejected items
//! are logged and counted; they never stop the batch, and entries already
//! committed stay committed whatever happens later.
//!
//! Two sources feed batches: JSON-lines files (`sentinel run`) and the
//! filesystem scanner (`sentinel scan`). A scan also owns the locations it
//! registered: a scanned location whose file is gone from the walk is
//! marked deleted in the same run, and a deleted file that reappears is
//! reactivated and detected as new content.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use content_sentinel_core::error::{EngineError, EngineResult};
use content_sentinel_core::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, NewContentLocation,
};
use content_sentinel_core::stats::RunStats;

use crate::config::{Config, FilesystemConnectorConfig};
use crate::connector_fs::{self, ScannedFile};
use crate::engine::{DetectInput, Engine};
use crate::runs::print_run_stats;

/// One line of a batch file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub page_number: Option<i64>,
    pub checksum: String,
    #[serde(default)]
    pub source_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<ContentMetadata>,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub stats: RunStats,
    pub rejected: usize,
    /// Locations marked deleted by this run.
    pub deleted: usize,
}

/// Parse a `YYYY-MM-DD` date as midnight UTC.
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow::anyhow!("Invalid date '{}'", raw))
}

/// Read a JSON-lines batch file. Blank lines are skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<BatchItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;

    let mut items = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: BatchItem = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed batch item", path.display(), i + 1))?;
        items.push(item);
    }
    Ok(items)
}

/// Run every item under a fresh run and return the run's statistics.
pub async fn run_batch(
    engine: &Engine,
    items: Vec<BatchItem>,
    since: Option<DateTime<Utc>>,
    run_id: Option<String>,
) -> Result<BatchSummary> {
    run_with_deletions(engine, items, Vec::new(), since, run_id).await
}

async fn run_with_deletions(
    engine: &Engine,
    items: Vec<BatchItem>,
    deletions: Vec<ContentLocation>,
    since: Option<DateTime<Utc>>,
    run_id: Option<String>,
) -> Result<BatchSummary> {
    let runs = engine.runs();
    let run_id = match run_id {
        Some(id) => runs.begin_run_with_id(id, since).await?,
        None => runs.begin_run(since).await?,
    };

    let mut rejected = 0usize;
    let mut deleted = 0usize;
    let mut failure = None;
    for (i, item) in items.into_iter().enumerate() {
        let result = match resolve_content_id(engine, &item).await {
            Ok(Some(content_id)) => detect_item(engine, &run_id, content_id, item).await,
            Ok(None) => {
                warn!(
                    run_id = %run_id,
                    item = i + 1,
                    "batch item rejected: neither content_id nor file_name"
                );
                rejected += 1;
                continue;
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {}
            Err(e) if e.is_rejection() => {
                warn!(run_id = %run_id, item = i + 1, error = %e, "batch item rejected");
                rejected += 1;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if failure.is_none() {
        for location in deletions {
            match engine.delete_in_run(&run_id, &location).await {
                Ok(_) => deleted += 1,
                Err(e) if skippable_deletion(&e) => {
                    warn!(
                        run_id = %run_id,
                        content_id = location.content_id,
                        error = %e,
                        "deletion skipped"
                    );
                    rejected += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
    }

    let stats = runs.end_run(&run_id).await?;
    if let Some(e) = failure {
        return Err(anyhow::Error::from(e).context(format!(
            "run {} stopped after {} committed entries",
            run_id, stats.total_pages_analyzed
        )));
    }
    Ok(BatchSummary {
        stats,
        rejected,
        deleted,
    })
}

/// A location changed under the scan or was rejected; the rest of the run
/// goes on.
fn skippable_deletion(err: &EngineError) -> bool {
    err.is_rejection() || matches!(err, EngineError::VersionConflict { .. })
}

/// The content id an item addresses, registering its location when it is
/// addressed by file name. `None` when the item names neither.
async fn resolve_content_id(engine: &Engine, item: &BatchItem) -> EngineResult<Option<i64>> {
    match (item.content_id, &item.file_name) {
        (Some(id), _) => Ok(Some(id)),
        (None, Some(file_name)) => {
            let location = engine
                .ensure_location(&NewContentLocation {
                    file_name: file_name.clone(),
                    page_number: item.page_number,
                    metadata: item.metadata.clone().unwrap_or_default(),
                })
                .await?;
            Ok(Some(location.content_id))
        }
        (None, None) => Ok(None),
    }
}

async fn detect_item(
    engine: &Engine,
    run_id: &str,
    content_id: i64,
    item: BatchItem,
) -> EngineResult<ChangeLogEntry> {
    engine
        .detect_in_run(
            run_id,
            DetectInput {
                content_id,
                checksum: item.checksum,
                source_modified_at: item.source_modified_at,
                metadata: item.metadata,
            },
        )
        .await
}

/// `sentinel run <file.jsonl>`
pub async fn run_jsonl(
    config: &Config,
    path: &Path,
    since: Option<String>,
    run_id: Option<String>,
) -> Result<()> {
    let since = since.as_deref().map(parse_since).transpose()?;
    let items = read_jsonl(path)?;
    if items.is_empty() {
        bail!("Batch file {} contains no items", path.display());
    }

    let engine = Engine::open(config).await?;
    let summary = run_batch(&engine, items, since, run_id).await;
    engine.close().await;
    let summary = summary?;

    print_summary(&summary);
    Ok(())
}

/// `sentinel scan`
pub async fn run_scan(config: &Config, since: Option<String>) -> Result<()> {
    let since = since.as_deref().map(parse_since).transpose()?;
    let fs_config = config
        .connectors
        .filesystem
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Filesystem connector not configured"))?;

    let files = connector_fs::scan_filesystem(config)?;
    info!(files = files.len(), root = %fs_config.root.display(), "filesystem scan complete");

    let engine = Engine::open(config).await?;
    let summary = scan_batch(&engine, &fs_config, files, since).await;
    engine.close().await;

    match summary? {
        Some(summary) => print_summary(&summary),
        None => println!("scan: no matching files"),
    }
    Ok(())
}

/// Turn one complete walk of the scan root into a run. `since` narrows the
/// files that are detected; deletions are judged against the whole walk.
/// Returns `None` when there is nothing to detect or delete.
pub async fn scan_batch(
    engine: &Engine,
    fs_config: &FilesystemConnectorConfig,
    files: Vec<ScannedFile>,
    since: Option<DateTime<Utc>>,
) -> Result<Option<BatchSummary>> {
    let registered: HashMap<String, ContentLocation> = engine
        .locations()
        .await?
        .into_iter()
        .filter(|l| l.page_number.is_none())
        .map(|l| (l.file_name.clone(), l))
        .collect();
    let walked: HashSet<&str> = files.iter().map(|f| f.file_name.as_str()).collect();

    let mut missing: Vec<ContentLocation> = registered
        .values()
        .filter(|l| l.status == ContentStatus::Active && !walked.contains(l.file_name.as_str()))
        .filter(|l| scanned_under(l, fs_config))
        .cloned()
        .collect();
    missing.sort_by_key(|l| l.content_id);

    let mut items = Vec::new();
    for f in &files {
        if since.is_some_and(|since| f.modified_at < since) {
            continue;
        }
        match registered.get(&f.file_name) {
            Some(l) if l.status == ContentStatus::Archived => {
                debug!(file = %f.file_name, "skipping archived location");
                continue;
            }
            Some(l) if l.status == ContentStatus::Deleted => {
                engine
                    .set_status(l.content_id, l.version, ContentStatus::Active)
                    .await?;
                info!(file = %f.file_name, content_id = l.content_id, "file reappeared");
            }
            _ => {}
        }
        items.push(scanned_item(f, fs_config));
    }

    if items.is_empty() && missing.is_empty() {
        return Ok(None);
    }
    run_with_deletions(engine, items, missing, since, None)
        .await
        .map(Some)
}

/// Whether the scanner registered `location` from this root.
fn scanned_under(location: &ContentLocation, fs_config: &FilesystemConnectorConfig) -> bool {
    location
        .metadata
        .source_file_path
        .as_deref()
        .is_some_and(|p| Path::new(p).starts_with(&fs_config.root))
}

fn scanned_item(f: &ScannedFile, fs_config: &FilesystemConnectorConfig) -> BatchItem {
    let title = f.path.file_name().map(|n| n.to_string_lossy().to_string());
    BatchItem {
        content_id: None,
        file_name: Some(f.file_name.clone()),
        page_number: None,
        checksum: f.checksum.to_string(),
        source_modified_at: Some(f.modified_at),
        metadata: Some(ContentMetadata {
            domain: fs_config.domain.clone(),
            service: fs_config.service.clone(),
            title,
            source_file_path: Some(f.path.display().to_string()),
            ..Default::default()
        }),
    }
}

fn print_summary(summary: &BatchSummary) {
    print_run_stats(&summary.stats);
    println!("  rejected:                 {}", summary.rejected);
    println!("  deleted:                  {}", summary.deleted);
    println!("ok");
}
