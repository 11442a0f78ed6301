//! Structured knowledge base.
//!
//! Entries are markdown files under `[knowledge_base] root` with TOML
//! front matter between `+++` lines:
//!
//! ```text
//! +++
//! id = "kb-docker-install"
//! title = "Install with Docker"
//! summary = "Pull the image and start the stack"
//! categories = ["Installation"]
//! status = "Published"
//! deprecated = false
//! +++
//! Body in markdown...
//! ```
//!
//! [`sync`] loads every entry, keeps those matching a [`KbFilter`] and
//! reindexes each one independently: a malformed entry or a failed
//! reindex is logged and counted, and the batch continues.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::KnowledgeBaseConfig;
use crate::error::HarnessError;
use crate::models::{Author, RawContent, SourceDocument, SourceKind};
use crate::pipeline::prepare_chunks;
use crate::reindex::Reindexer;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KbCategory {
    Installation,
    Deploy,
    Configs,
    #[serde(rename = "Bot Errors")]
    BotErrors,
}

impl KbCategory {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "installation" => Some(Self::Installation),
            "deploy" => Some(Self::Deploy),
            "configs" => Some(Self::Configs),
            "bot errors" | "bot-errors" => Some(Self::BotErrors),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installation => "Installation",
            Self::Deploy => "Deploy",
            Self::Configs => "Configs",
            Self::BotErrors => "Bot Errors",
        }
    }
}

impl fmt::Display for KbCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KbStatus {
    Published,
    /// Entries without a `status` are drafts.
    #[default]
    Draft,
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    status: KbStatus,
    #[serde(default)]
    deprecated: bool,
    author: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KbEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub categories: BTreeSet<KbCategory>,
    pub status: KbStatus,
    pub deprecated: bool,
    pub author: Option<String>,
    pub body: String,
}

impl KbEntry {
    /// Document-store form; the entry id is the link.
    pub fn to_document(&self) -> SourceDocument {
        let author = Author::from_name(self.author.as_deref());
        let raw = RawContent::new("knowledge_base", &author)
            .with_field("title", self.title.clone())
            .with_field("summary", self.summary.clone())
            .with_field("content", self.body.clone());
        let mut doc = SourceDocument::new(SourceKind::KnowledgeBase, &self.id, raw);
        doc.metadata = serde_json::json!({
            "categories": self.categories.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "status": self.status,
            "deprecated": self.deprecated,
        });
        doc
    }
}

/// Parse one entry. `item` names it in errors.
///
/// # Errors
///
/// [`HarnessError::Validation`] for missing front matter, invalid TOML, a
/// missing or empty `id`, or an unknown category.
pub fn parse_entry(item: &str, text: &str) -> Result<KbEntry> {
    let text = text.trim_start_matches('\u{feff}');
    let rest = text
        .strip_prefix("+++")
        .ok_or_else(|| HarnessError::validation(item, "missing +++ front matter"))?;
    let end = rest
        .find("\n+++")
        .ok_or_else(|| HarnessError::validation(item, "unterminated front matter"))?;
    let header = &rest[..end];
    let body = rest[end + 4..].trim().to_string();

    let fm: FrontMatter = toml::from_str(header)
        .map_err(|e| HarnessError::validation(item, format!("invalid front matter: {}", e)))?;

    let id = fm
        .id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HarnessError::validation(item, "missing id"))?;

    let mut categories = BTreeSet::new();
    for label in &fm.categories {
        let cat = KbCategory::parse(label).ok_or_else(|| {
            HarnessError::validation(item, format!("unknown category '{}'", label))
        })?;
        categories.insert(cat);
    }

    Ok(KbEntry {
        title: fm.title.unwrap_or_else(|| id.clone()),
        id,
        summary: fm.summary,
        categories,
        status: fm.status,
        deprecated: fm.deprecated,
        author: fm.author,
        body,
    })
}

/// Which entries a sync covers.
#[derive(Debug, Clone, PartialEq)]
pub struct KbFilter {
    /// OR-combined; empty matches every category.
    pub categories: BTreeSet<KbCategory>,
    pub include_deprecated: bool,
}

impl Default for KbFilter {
    fn default() -> Self {
        Self {
            categories: BTreeSet::from([KbCategory::Installation]),
            include_deprecated: false,
        }
    }
}

impl KbFilter {
    pub fn from_config(config: &KnowledgeBaseConfig) -> Result<Self> {
        Self::from_labels(&config.categories, config.include_deprecated)
    }

    /// Filter for a `kb sync` run: explicit `categories` replace the
    /// configured ones, and deprecated entries are included when either the
    /// flag or the config asks for them.
    pub fn for_sync(
        config: &KnowledgeBaseConfig,
        categories: &[String],
        include_deprecated: bool,
    ) -> Result<Self> {
        let labels = if categories.is_empty() {
            &config.categories
        } else {
            categories
        };
        Self::from_labels(labels, include_deprecated || config.include_deprecated)
    }

    pub fn from_labels(labels: &[String], include_deprecated: bool) -> Result<Self> {
        let mut categories = BTreeSet::new();
        for label in labels {
            let cat = KbCategory::parse(label)
                .ok_or_else(|| anyhow::anyhow!("unknown knowledge-base category '{}'", label))?;
            categories.insert(cat);
        }
        Ok(Self {
            categories,
            include_deprecated,
        })
    }

    pub fn matches(&self, entry: &KbEntry) -> bool {
        if entry.deprecated && !self.include_deprecated {
            return false;
        }
        self.categories.is_empty() || !self.categories.is_disjoint(&entry.categories)
    }
}

/// Entries loaded from disk, plus the ones rejected while parsing.
#[derive(Debug, Default)]
pub struct LoadedEntries {
    pub entries: Vec<KbEntry>,
    pub rejected: Vec<(PathBuf, String)>,
}

/// Parse every `*.md` file under `root`, in path order.
pub fn load_entries(root: &Path) -> Result<LoadedEntries> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "md") {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    let mut loaded = LoadedEntries::default();
    for path in paths {
        let label = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let parsed = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|text| parse_entry(&label, &text));
        match parsed {
            Ok(entry) => loaded.entries.push(entry),
            Err(e) => {
                tracing::warn!(path = %label, error = %e, "rejected knowledge-base entry");
                loaded.rejected.push((path, e.to_string()));
            }
        }
    }
    Ok(loaded)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KbSyncReport {
    /// Markdown files found under the root.
    pub found: usize,
    pub synced: usize,
    /// Filtered out by category or deprecation.
    pub skipped: usize,
    /// Rejected while parsing or failed to reindex.
    pub failed: usize,
    pub chunks: usize,
}

/// Reindex every entry under `root` that `filter` accepts.
///
/// With `dry_run`, chunks are computed and counted but nothing is
/// embedded or written.
pub async fn sync(
    root: &Path,
    filter: &KbFilter,
    reindexer: &Reindexer,
    docs: &dyn DocumentStore,
    dry_run: bool,
) -> Result<KbSyncReport> {
    let loaded = load_entries(root)?;
    let mut report = KbSyncReport {
        found: loaded.entries.len() + loaded.rejected.len(),
        failed: loaded.rejected.len(),
        ..Default::default()
    };

    for entry in &loaded.entries {
        if !filter.matches(entry) {
            report.skipped += 1;
            continue;
        }

        let doc = entry.to_document();
        if dry_run {
            report.chunks += prepare_chunks(&doc, reindexer.params()).len();
            report.synced += 1;
            continue;
        }

        match sync_one(doc, reindexer, docs).await {
            Ok(inserted) => {
                report.synced += 1;
                report.chunks += inserted;
                tracing::info!(id = %entry.id, title = %entry.title, chunks = inserted, "synced entry");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(id = %entry.id, error = %e, "failed to sync entry");
            }
        }
    }

    Ok(report)
}

async fn sync_one(
    doc: SourceDocument,
    reindexer: &Reindexer,
    docs: &dyn DocumentStore,
) -> Result<usize> {
    let saved = docs.save(doc).await?;
    let report = reindexer.reindex(&saved).await?;
    Ok(report.inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = r#"+++
id = "kb-docker"
title = "Install with Docker"
summary = "Pull and start"
categories = ["Installation", "Bot Errors"]
+++

Run `docker compose up -d`.
"#;

    #[test]
    fn test_parse_entry() {
        let e = parse_entry("docker.md", ENTRY).unwrap();
        assert_eq!(e.id, "kb-docker");
        assert_eq!(e.title, "Install with Docker");
        assert_eq!(e.status, KbStatus::Draft);
        assert!(!e.deprecated);
        assert!(e.categories.contains(&KbCategory::BotErrors));
        assert_eq!(e.body, "Run `docker compose up -d`.");
    }

    #[test]
    fn test_missing_id_is_validation_error() {
        let err = parse_entry("x.md", "+++\ntitle = \"No id\"\n+++\nbody").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::Validation { .. })
        ));
    }

    #[test]
    fn test_missing_front_matter_rejected() {
        assert!(parse_entry("x.md", "just markdown").is_err());
        assert!(parse_entry("x.md", "+++\nid = \"a\"\nno end").is_err());
    }

    #[test]
    fn test_filter_or_categories_and_deprecated() {
        let mut e = parse_entry("docker.md", ENTRY).unwrap();
        let deploy_only = KbFilter::from_labels(&["Deploy".into()], false).unwrap();
        let errors = KbFilter::from_labels(&["Deploy".into(), "bot errors".into()], false).unwrap();
        assert!(!deploy_only.matches(&e));
        assert!(errors.matches(&e));
        assert!(KbFilter::default().matches(&e));

        e.deprecated = true;
        assert!(!KbFilter::default().matches(&e));
        let with_deprecated = KbFilter {
            include_deprecated: true,
            ..KbFilter::default()
        };
        assert!(with_deprecated.matches(&e));
    }

    #[test]
    fn test_sync_filter_keeps_configured_deprecated_flag() {
        let config = KnowledgeBaseConfig {
            root: PathBuf::from("kb"),
            categories: vec!["Installation".into()],
            include_deprecated: true,
        };
        let configured = KbFilter::for_sync(&config, &[], false).unwrap();
        assert!(configured.include_deprecated);
        assert!(configured.categories.contains(&KbCategory::Installation));

        let explicit = KbFilter::for_sync(&config, &["Deploy".into()], false).unwrap();
        assert!(explicit.include_deprecated);
        assert_eq!(explicit.categories, BTreeSet::from([KbCategory::Deploy]));

        let strict = KnowledgeBaseConfig {
            include_deprecated: false,
            ..config
        };
        let deploy = vec!["Deploy".to_string()];
        assert!(!KbFilter::for_sync(&strict, &deploy, false).unwrap().include_deprecated);
        assert!(KbFilter::for_sync(&strict, &deploy, true).unwrap().include_deprecated);
    }

    #[test]
    fn test_unknown_filter_label_errors() {
        assert!(KbFilter::from_labels(&["Marketing".into()], false).is_err());
    }

    #[test]
    fn test_to_document_carries_categories() {
        let doc = parse_entry("docker.md", ENTRY).unwrap().to_document();
        assert_eq!(doc.kind, SourceKind::KnowledgeBase);
        assert_eq!(doc.link, "kb-docker");
        assert_eq!(doc.title.as_deref(), Some("Install with Docker"));
        assert_eq!(
            doc.metadata["categories"],
            serde_json::json!(["Installation", "Bot Errors"])
        );
    }
}
