//! TOML configuration parsing and validation.
//!
//! Content Sentinel is configured via a single TOML file (default:
//! `config/sentinel.toml`). Only `[db]` is required; every other section
//! has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/sentinel.sqlite"
//!
//! [detection]
//! faq_timeout_ms = 2000
//! max_append_attempts = 3
//!
//! [faq_store]
//! kind = "sqlite"          # sqlite | http | disabled
//!
//! [queue]
//! default_limit = 50
//!
//! [server]
//! bind = "127.0.0.1:7440"
//!
//! [connectors.filesystem]
//! root = "./docs"
//! include_globs = ["**/*.md"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub faq_store: FaqStoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Upper bound on a single FAQ store lookup.
    #[serde(default = "default_faq_timeout_ms")]
    pub faq_timeout_ms: u64,
    /// Attempts at the conditional append before giving up on a content id.
    #[serde(default = "default_max_append_attempts")]
    pub max_append_attempts: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            faq_timeout_ms: default_faq_timeout_ms(),
            max_append_attempts: default_max_append_attempts(),
        }
    }
}

impl DetectionConfig {
    pub fn faq_timeout(&self) -> Duration {
        Duration::from_millis(self.faq_timeout_ms)
    }
}

fn default_faq_timeout_ms() -> u64 {
    2000
}
fn default_max_append_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaqStoreConfig {
    #[serde(default = "default_faq_kind")]
    pub kind: String,
    /// Count endpoint for `kind = "http"`; called as `GET {url}?checksum=<hex>`.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for FaqStoreConfig {
    fn default() -> Self {
        Self {
            kind: default_faq_kind(),
            url: None,
        }
    }
}

fn default_faq_kind() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_limit")]
    pub default_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_limit: default_queue_limit(),
        }
    }
}

fn default_queue_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7440".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Stamped on every location the scanner registers.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Config {
    /// Configuration with only a database path, everything else defaulted.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            detection: DetectionConfig::default(),
            faq_store: FaqStoreConfig::default(),
            queue: QueueConfig::default(),
            server: ServerConfig::default(),
            connectors: ConnectorsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.detection.faq_timeout_ms == 0 {
        anyhow::bail!("detection.faq_timeout_ms must be > 0");
    }

    if config.detection.max_append_attempts == 0 {
        anyhow::bail!("detection.max_append_attempts must be >= 1");
    }

    if config.queue.default_limit == 0 {
        anyhow::bail!("queue.default_limit must be >= 1");
    }

    match config.faq_store.kind.as_str() {
        "sqlite" | "disabled" => {}
        "http" => {
            if config.faq_store.url.is_none() {
                anyhow::bail!("faq_store.url must be specified when kind is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown FAQ store kind: '{}'. Must be sqlite, http, or disabled.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"/tmp/s.sqlite\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.detection.faq_timeout_ms, 2000);
        assert_eq!(config.detection.max_append_attempts, 3);
        assert_eq!(config.faq_store.kind, "sqlite");
        assert_eq!(config.queue.default_limit, 50);
        assert!(config.connectors.filesystem.is_none());
    }

    #[test]
    fn test_http_store_requires_url() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[faq_store]\nkind = \"http\"\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("faq_store.url"));
    }

    #[test]
    fn test_rejects_unknown_store_kind() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[faq_store]\nkind = \"redis\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[detection]\nfaq_timeout_ms = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
