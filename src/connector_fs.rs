//! Filesystem scanner.
//!
//! Walks `[connectors.filesystem].root`, applies the include/exclude globs
//! and hashes every matching file with SHA-256. Each file becomes one
//! single-page content location keyed by its path relative to the root.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use content_sentinel_core::clock::truncate_to_micros;
use content_sentinel_core::Checksum;

use crate::config::Config;

/// One hashed file.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub file_name: String,
    pub path: PathBuf,
    pub checksum: Checksum,
    pub modified_at: DateTime<Utc>,
}

pub fn scan_filesystem(config: &Config) -> Result<Vec<ScannedFile>> {
    let fs_config = config
        .connectors
        .filesystem
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Filesystem connector not configured"))?;

    let root = &fs_config.root;
    if !root.exists() {
        bail!(
            "Filesystem connector root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&fs_config.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(fs_config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(hash_file(path, rel_str)?);
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}

fn hash_file(path: &Path, file_name: String) -> Result<ScannedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let modified = std::fs::metadata(path)?.modified()?;

    Ok(ScannedFile {
        file_name,
        path: path.to_path_buf(),
        checksum: Checksum::of_bytes(&bytes),
        modified_at: truncate_to_micros(DateTime::<Utc>::from(modified)),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesystemConnectorConfig;
    use tempfile::TempDir;

    fn config_for(root: &Path, include: &[&str], exclude: &[&str]) -> Config {
        let mut config = Config::with_db_path(root.join("db.sqlite"));
        config.connectors.filesystem = Some(FilesystemConnectorConfig {
            root: root.to_path_buf(),
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            follow_symlinks: false,
            domain: None,
            service: None,
        });
        config
    }

    #[test]
    fn test_scan_applies_globs_and_sorts() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("policies/drafts")).unwrap();
        std::fs::write(tmp.path().join("policies/leave.md"), "leave").unwrap();
        std::fs::write(tmp.path().join("policies/drafts/wip.md"), "wip").unwrap();
        std::fs::write(tmp.path().join("about.md"), "about").unwrap();
        std::fs::write(tmp.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let config = config_for(tmp.path(), &["**/*.md"], &["**/drafts/**"]);
        let files = scan_filesystem(&config).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["about.md", "policies/leave.md"]);
    }

    #[test]
    fn test_scan_checksum_is_sha256_of_contents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "hello").unwrap();
        let config = config_for(tmp.path(), &["**/*.md"], &[]);
        let files = scan_filesystem(&config).unwrap();
        assert_eq!(
            files[0].checksum.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_scan_requires_existing_root() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp.path().join("missing"), &["**/*"], &[]);
        assert!(scan_filesystem(&config).is_err());
    }

    #[test]
    fn test_scan_requires_connector_config() {
        let config = Config::with_db_path("x.sqlite");
        let err = scan_filesystem(&config).unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
