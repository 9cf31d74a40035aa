//! # Content Sentinel
//!
//! Content change detection and FAQ regeneration queue engine.
//!
//! Every ingested page arrives with a SHA-256 checksum. The engine compares
//! it with the last checksum recorded for the same content location,
//! appends an immutable decision to the change log, and derives from that
//! log a priority-ordered queue of content whose FAQs must be regenerated.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ Ingestion   │──▶│   Detector   │──▶│ content_change_  │
//! │ JSONL / FS  │   │ lock+baseline│   │ log (append-only)│
//! └─────────────┘   └──────┬───────┘   └────────┬─────────┘
//!                          │ FAQ count          │
//!                    ┌─────▼─────┐        ┌─────▼──────┐
//!                    │ FAQ store │        │ Queue/Stats│──▶ CLI, HTTP
//!                    └───────────┘        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sentinel init
//! sentinel scan                        # hash the configured docs folder
//! sentinel run batch.jsonl --since 2026-01-01
//! sentinel queue --limit 20
//! sentinel serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite change log, registry and FAQ counts |
//! | [`faq`] | FAQ store backends |
//! | [`locks`] | Per-content-id async locks |
//! | [`detector`] | Change detection |
//! | [`coordinator`] | Detection runs |
//! | [`engine`] | Wiring for CLI and server |
//! | [`connector_fs`] | Filesystem scanner |
//! | [`ingest`] | Batch runs |
//! | [`server`] | HTTP server |
//!
//! Domain types, the baseline projection, the queue builder and the
//! in-memory backends live in the `content-sentinel-core` crate.

pub mod config;
pub mod connector_fs;
pub mod content;
pub mod coordinator;
pub mod db;
pub mod detector;
pub mod engine;
pub mod faq;
pub mod ingest;
pub mod locks;
pub mod migrate;
pub mod queue;
pub mod runs;
pub mod server;
pub mod sqlite_store;
pub mod stats;
