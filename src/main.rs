//! # Content Sentinel CLI (`sentinel`)
//!
//! ## Usage
//!
//! ```bash
//! sentinel --config ./config/sentinel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sentinel init` | Create the SQLite database and run schema migrations |
//! | `sentinel register` | Register a content location |
//! | `sentinel update <id>` | Update metadata or status (optimistic version check) |
//! | `sentinel locations` | List registered content |
//! | `sentinel detect <id>` | Ad-hoc detection for one content id |
//! | `sentinel run <file>` | Detection run from a JSON-lines batch |
//! | `sentinel scan` | Detection run over the configured filesystem root |
//! | `sentinel queue` | Print the regeneration queue |
//! | `sentinel runs` | List detection runs |
//! | `sentinel run-stats <id>` | Statistics for one run |
//! | `sentinel history <id>` | Change log for one content id |
//! | `sentinel stats` | Database overview |
//! | `sentinel serve` | Start the HTTP server |
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default) so stdout
//! stays parseable for `--json` output.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use content_sentinel_core::models::ContentStatus;
use content_sentinel_core::queue::QueueLimit;

use content_sentinel::content::MetadataArgs;
use content_sentinel::{config, content, ingest, migrate, queue, runs, server, stats};

/// Content Sentinel: checksum-based change detection and FAQ regeneration queue.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sentinel.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "sentinel", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sentinel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Register a content location and print its id.
    Register {
        /// Source file name (unique together with the page number).
        #[arg(long)]
        file_name: String,

        /// Page number; omit for single-page documents.
        #[arg(long)]
        page: Option<i64>,

        #[command(flatten)]
        metadata: MetadataFlags,
    },

    /// Update a location's metadata and/or status.
    ///
    /// Fails with a version conflict if the stored version differs from
    /// `--expected-version`.
    Update {
        content_id: i64,

        #[arg(long)]
        expected_version: i64,

        /// New status: `active`, `archived` or `deleted`.
        #[arg(long)]
        status: Option<ContentStatus>,

        #[command(flatten)]
        metadata: MetadataFlags,
    },

    /// List registered content locations.
    Locations {
        #[arg(long)]
        json: bool,
    },

    /// Run one ad-hoc detection (not part of any run).
    Detect {
        content_id: i64,

        /// SHA-256 digest of the content, 64 hex characters.
        #[arg(long)]
        checksum: String,

        /// Source modification time, RFC 3339.
        #[arg(long)]
        modified_at: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },

    /// Run a detection batch from a JSON-lines file.
    ///
    /// Each line: `{"content_id": 7, "checksum": "...", "source_modified_at": "..."}`
    /// or `{"file_name": "a.pdf", "page_number": 2, ...}` to register on first sight.
    Run {
        file: PathBuf,

        /// Start of the detection window (YYYY-MM-DD), stamped on every entry.
        #[arg(long)]
        since: Option<String>,

        /// Explicit run id instead of the current timestamp.
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Hash the configured filesystem root and run a detection batch.
    Scan {
        /// Only files modified on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,
    },

    /// Print the regeneration queue, highest priority first.
    Queue {
        /// Maximum items (defaults to `[queue].default_limit`).
        #[arg(long, conflicts_with = "all")]
        limit: Option<usize>,

        /// Print every pending item.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// List detection runs.
    Runs {
        #[arg(long)]
        json: bool,
    },

    /// Statistics for one detection run.
    RunStats {
        run_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Change log for one content id.
    History {
        content_id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Show a database overview.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Args, Debug)]
struct MetadataFlags {
    #[arg(long)]
    domain: Option<String>,
    #[arg(long)]
    service: Option<String>,
    #[arg(long)]
    title: Option<String>,
    /// Repeatable.
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "org")]
    org_context: Option<String>,
    #[arg(long = "section")]
    section_name: Option<String>,
}

impl From<MetadataFlags> for MetadataArgs {
    fn from(f: MetadataFlags) -> Self {
        MetadataArgs {
            domain: f.domain,
            service: f.service,
            title: f.title,
            tags: f.tags,
            org_context: f.org_context,
            section_name: f.section_name,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Register {
            file_name,
            page,
            metadata,
        } => {
            content::run_register(&cfg, file_name, page, metadata.into()).await?;
        }
        Commands::Update {
            content_id,
            expected_version,
            status,
            metadata,
        } => {
            content::run_update(&cfg, content_id, expected_version, status, metadata.into())
                .await?;
        }
        Commands::Locations { json } => {
            content::run_locations(&cfg, json).await?;
        }
        Commands::Detect {
            content_id,
            checksum,
            modified_at,
            json,
        } => {
            content::run_detect(&cfg, content_id, checksum, modified_at, json).await?;
        }
        Commands::Run {
            file,
            since,
            run_id,
        } => {
            ingest::run_jsonl(&cfg, &file, since, run_id).await?;
        }
        Commands::Scan { since } => {
            ingest::run_scan(&cfg, since).await?;
        }
        Commands::Queue { limit, all, json } => {
            let limit = match (limit, all) {
                (_, true) => QueueLimit::All,
                (Some(n), false) => QueueLimit::At(n),
                (None, false) => QueueLimit::Default,
            };
            queue::run_queue(&cfg, limit, json).await?;
        }
        Commands::Runs { json } => {
            runs::run_list(&cfg, json).await?;
        }
        Commands::RunStats { run_id, json } => {
            runs::run_show(&cfg, &run_id, json).await?;
        }
        Commands::History { content_id, json } => {
            content::run_history(&cfg, content_id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
