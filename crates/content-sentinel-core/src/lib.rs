//! # Content Sentinel Core
//!
//! Shared, runtime-agnostic logic for Content Sentinel: the change-log data
//! model, checksum identity, storage traits, the baseline projection, run
//! statistics and the regeneration queue ordering.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Storage backends and the detection engine
//! that serializes writers live in the `content-sentinel` crate.

pub mod baseline;
pub mod checksum;
pub mod clock;
pub mod error;
pub mod models;
pub mod queue;
pub mod stats;
pub mod store;

pub use checksum::Checksum;
pub use error::{EngineError, EngineResult};
