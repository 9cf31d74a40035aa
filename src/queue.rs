//! Regeneration queue output (`sentinel queue`).
//!
//! `--json` prints the queue snapshot (items plus the total before the
//! limit) for the FAQ pipeline; the default is a table for humans.

use anyhow::{bail, Result};

use content_sentinel_core::queue::{QueueLimit, QueueSnapshot};

use crate::config::Config;
use crate::engine::Engine;
use crate::stats::format_ts;

pub async fn run_queue(config: &Config, limit: QueueLimit, json: bool) -> Result<()> {
    if limit == QueueLimit::At(0) {
        bail!("--limit must be >= 1");
    }
    let engine = Engine::open(config).await?;
    let snapshot = engine.queue(limit).await;
    engine.close().await;
    let snapshot = snapshot?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_table(&snapshot);
    }
    Ok(())
}

fn print_table(snapshot: &QueueSnapshot) {
    let items = &snapshot.items;
    if items.is_empty() {
        println!("Nothing to regenerate.");
        return;
    }

    println!(
        "{:>4} {:>6} {:>7} {:>5} {:>5}  {:<17} {:<19}  {}",
        "RANK", "ID", "SCORE", "FAQS", "DAYS", "CHANGE", "DETECTED", "LOCATION"
    );
    println!("{}", "-".repeat(96));
    for item in items {
        println!(
            "{:>4} {:>6} {:>7} {:>5} {:>5}  {:<17} {:<19}  {}",
            item.rank,
            item.content_id,
            item.priority_score,
            item.existing_faq_count,
            item.days_since_modified,
            item.change_type.as_str(),
            format_ts(item.detected_at),
            location_label(&item.file_name, item.page_number)
        );
    }
    if snapshot.truncated {
        println!(
            "showing {} of {} (use --all for everything)",
            items.len(),
            snapshot.total
        );
    }
}

pub fn location_label(file_name: &str, page_number: Option<i64>) -> String {
    match page_number {
        Some(p) => format!("{} p.{}", file_name, p),
        None => file_name.to_string(),
    }
}
