//! Local directory or file connector.
//!
//! Handles `file://` links and paths that exist on disk. A directory is
//! walked with the configured include/exclude globs and becomes one
//! [`RawContent`] keyed by relative path; a single file becomes one field.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::Connector;
use crate::config::FilesystemConnectorConfig;
use crate::models::{Author, RawContent, SourceKind};

pub struct FilesystemConnector {
    config: FilesystemConnectorConfig,
}

impl FilesystemConnector {
    pub fn new(config: FilesystemConnectorConfig) -> Self {
        Self { config }
    }
}

fn local_path(link: &str) -> PathBuf {
    PathBuf::from(link.strip_prefix("file://").unwrap_or(link))
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Local markdown and text files"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    fn matches(&self, link: &str) -> bool {
        link.starts_with("file://") || (!link.contains("://") && Path::new(link).exists())
    }

    async fn fetch(&self, link: &str, author: &Author) -> Result<RawContent> {
        let path = local_path(link);
        let config = self.config.clone();
        let author = author.clone();
        tokio::task::spawn_blocking(move || scan_path(&path, &config, &author))
            .await
            .context("filesystem worker panicked")?
    }
}

/// Read `path` (file or directory) into a [`RawContent`].
pub fn scan_path(
    path: &Path,
    config: &FilesystemConnectorConfig,
    author: &Author,
) -> Result<RawContent> {
    if !path.exists() {
        bail!("Filesystem path does not exist: {}", path.display());
    }

    let mut raw = RawContent::new("filesystem", author);

    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        raw.content.push((name, text));
        return Ok(raw);
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = entry.path();
        let relative = file.strip_prefix(path).unwrap_or(file);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        match std::fs::read_to_string(file) {
            Ok(text) => files.push((rel_str, text)),
            Err(e) => tracing::warn!(path = %rel_str, error = %e, "skipping unreadable file"),
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    raw.content = files;
    Ok(raw)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
