//! Registry and single-content commands.
//!
//! `register`, `update`, `locations`, `detect` and `history`. These are
//! the manual counterparts of what an ingestion pipeline does through a
//! batch run.

use anyhow::Result;
use chrono::{DateTime, Utc};

use content_sentinel_core::models::{
    ChangeLogEntry, ContentLocation, ContentMetadata, ContentStatus, NewContentLocation,
};

use crate::config::Config;
use crate::engine::{DetectInput, Engine};
use crate::queue::location_label;
use crate::stats::format_ts;

/// Metadata fields settable from the command line.
#[derive(Debug, Clone, Default)]
pub struct MetadataArgs {
    pub domain: Option<String>,
    pub service: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub org_context: Option<String>,
    pub section_name: Option<String>,
}

impl MetadataArgs {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.service.is_none()
            && self.title.is_none()
            && self.tags.is_empty()
            && self.org_context.is_none()
            && self.section_name.is_none()
    }

    /// Overlay the supplied fields on `base`. Tags replace, they do not merge.
    pub fn apply(&self, base: &ContentMetadata) -> ContentMetadata {
        let mut m = base.clone();
        if let Some(ref v) = self.domain {
            m.domain = Some(v.clone());
        }
        if let Some(ref v) = self.service {
            m.service = Some(v.clone());
        }
        if let Some(ref v) = self.title {
            m.title = Some(v.clone());
        }
        if !self.tags.is_empty() {
            m.tags = self.tags.clone();
        }
        if let Some(ref v) = self.org_context {
            m.org_context = Some(v.clone());
        }
        if let Some(ref v) = self.section_name {
            m.section_name = Some(v.clone());
        }
        m
    }
}

/// `sentinel register`
pub async fn run_register(
    config: &Config,
    file_name: String,
    page_number: Option<i64>,
    metadata: MetadataArgs,
) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = engine
        .register(&NewContentLocation {
            file_name,
            page_number,
            metadata: metadata.apply(&ContentMetadata::default()),
        })
        .await;
    engine.close().await;
    let location = result?;

    println!(
        "registered content {} ({}) version {}",
        location.content_id,
        location_label(&location.file_name, location.page_number),
        location.version
    );
    Ok(())
}

/// `sentinel update`
pub async fn run_update(
    config: &Config,
    content_id: i64,
    expected_version: i64,
    status: Option<ContentStatus>,
    metadata: MetadataArgs,
) -> Result<()> {
    if status.is_none() && metadata.is_empty() {
        anyhow::bail!("Nothing to update: pass --status or at least one metadata flag");
    }

    let engine = Engine::open(config).await?;
    let result = update(&engine, content_id, expected_version, status, &metadata).await;
    engine.close().await;
    let location = result?;

    println!(
        "updated content {} to version {} (status {})",
        location.content_id,
        location.version,
        location.status.as_str()
    );
    Ok(())
}

async fn update(
    engine: &Engine,
    content_id: i64,
    expected_version: i64,
    status: Option<ContentStatus>,
    metadata: &MetadataArgs,
) -> Result<ContentLocation> {
    let mut location = engine.location(content_id).await?;
    let mut version = expected_version;

    if !metadata.is_empty() {
        let merged = metadata.apply(&location.metadata);
        location = engine.update_metadata(content_id, version, &merged).await?;
        version = location.version;
    }
    if let Some(status) = status {
        location = engine.set_status(content_id, version, status).await?;
    }
    Ok(location)
}

/// `sentinel locations`
pub async fn run_locations(config: &Config, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = engine.locations().await;
    engine.close().await;
    let locations = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&locations)?);
        return Ok(());
    }

    if locations.is_empty() {
        println!("No content registered.");
        return Ok(());
    }

    println!(
        "{:>6} {:>4} {:<9} {:<14} {:<14}  {}",
        "ID", "VER", "STATUS", "DOMAIN", "SERVICE", "LOCATION"
    );
    println!("{}", "-".repeat(80));
    for l in &locations {
        println!(
            "{:>6} {:>4} {:<9} {:<14} {:<14}  {}",
            l.content_id,
            l.version,
            l.status.as_str(),
            l.metadata.domain.as_deref().unwrap_or("-"),
            l.metadata.service.as_deref().unwrap_or("-"),
            location_label(&l.file_name, l.page_number)
        );
    }
    Ok(())
}

/// `sentinel detect`
pub async fn run_detect(
    config: &Config,
    content_id: i64,
    checksum: String,
    modified_at: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = engine
        .detect_ad_hoc(DetectInput {
            content_id,
            checksum,
            source_modified_at: modified_at,
            metadata: None,
        })
        .await;
    engine.close().await;
    let entry = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_entry(&entry);
    }
    Ok(())
}

/// `sentinel history`
pub async fn run_history(config: &Config, content_id: i64, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = async {
        let location = engine.location(content_id).await?;
        let history = engine.history(content_id).await?;
        Ok::<_, content_sentinel_core::EngineError>((location, history))
    }
    .await;
    engine.close().await;
    let (location, history) = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!("--- Content {} ---", location.content_id);
    println!(
        "location:  {}",
        location_label(&location.file_name, location.page_number)
    );
    println!("status:    {}", location.status.as_str());
    println!("version:   {}", location.version);
    println!("updated:   {}", format_ts(location.updated_at));
    println!();

    println!("--- Change log ({}) ---", history.len());
    for entry in &history {
        let run = if entry.detection_run_id.is_empty() {
            "ad-hoc"
        } else {
            entry.detection_run_id.as_str()
        };
        println!(
            "#{:<6} {}  {:<17} regen={:<5} faqs={:<3} {}  run={}",
            entry.change_id,
            format_ts(entry.detected_at),
            entry.change_type.as_str(),
            entry.requires_regeneration,
            entry.existing_faq_count,
            &entry.content_checksum.as_str()[..12],
            run
        );
    }
    Ok(())
}

fn print_entry(entry: &ChangeLogEntry) {
    println!("change {}", entry.change_id);
    println!("  content:               {}", entry.content_id);
    println!(
        "  location:              {}",
        location_label(&entry.file_name, entry.page_number)
    );
    println!("  change type:           {}", entry.change_type);
    println!("  requires regeneration: {}", entry.requires_regeneration);
    println!("  existing FAQs:         {}", entry.existing_faq_count);
    println!("  checksum:              {}", entry.content_checksum);
    if let Some(ref prev) = entry.previous_checksum {
        println!("  previous checksum:     {}", prev);
    }
    println!("  detected at:           {}", format_ts(entry.detected_at));
}
