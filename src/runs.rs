//! Run listing and per-run statistics (`sentinel runs`, `sentinel run-stats`).

use anyhow::Result;

use content_sentinel_core::stats::RunStats;

use crate::config::Config;
use crate::engine::Engine;
use crate::stats::format_ts;

/// `sentinel runs`
pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let runs = engine.runs().list_runs().await;
    engine.close().await;
    let runs = runs?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No detection runs recorded.");
        return Ok(());
    }

    println!(
        "{:<30} {:>8} {:>8} {:>10} {:>7}",
        "RUN", "PAGES", "REGEN", "FAQS", "FILES"
    );
    println!("{}", "-".repeat(67));
    for r in &runs {
        println!(
            "{:<30} {:>8} {:>8} {:>10} {:>7}",
            r.run_id,
            r.total_pages_analyzed,
            r.pages_requiring_regeneration,
            r.faqs_to_invalidate,
            r.distinct_files
        );
    }
    Ok(())
}

/// `sentinel run-stats <id>`
pub async fn run_show(config: &Config, run_id: &str, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let stats = engine.runs().run_stats(run_id).await;
    engine.close().await;
    let stats = stats?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_run_stats(&stats);
    }
    Ok(())
}

pub fn print_run_stats(stats: &RunStats) {
    let opt = |ts: Option<chrono::DateTime<chrono::Utc>>| {
        ts.map(format_ts).unwrap_or_else(|| "-".to_string())
    };

    println!("run {}", stats.run_id);
    println!("  pages analyzed:           {}", stats.total_pages_analyzed);
    println!("  requiring regeneration:   {}", stats.pages_requiring_regeneration);
    println!("  not requiring:            {}", stats.pages_not_requiring_regeneration);
    println!("  existing FAQs:            {}", stats.total_existing_faqs);
    println!("  FAQs to invalidate:       {}", stats.faqs_to_invalidate);
    println!("  distinct files:           {}", stats.distinct_files);
    println!("  distinct checksums:       {}", stats.distinct_checksums);
    println!("  since:                    {}", opt(stats.earliest_since_date));
    println!("  first detected:           {}", opt(stats.first_detected_at));
    println!("  last detected:            {}", opt(stats.last_detected_at));
}
