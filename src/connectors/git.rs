//! GitHub repository connector.
//!
//! Shallow-clones the repository with the `git` CLI into a cache
//! directory (or fast-forwards an existing clone), then walks the tree.
//! The whole repository becomes one [`RawContent`] whose fields are
//! `(relative path, file text)`, sorted by path.
//!
//! Paths are skipped when any component equals, or the file name ends
//! with, an entry of `[connectors.git] ignore`. Files that are not valid
//! UTF-8 are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use super::Connector;
use crate::config::GitConnectorConfig;
use crate::models::{Author, RawContent, SourceKind};

pub struct GitConnector {
    config: GitConnectorConfig,
    db_path: PathBuf,
}

impl GitConnector {
    pub fn new(config: GitConnectorConfig, db_path: PathBuf) -> Self {
        Self { config, db_path }
    }

    fn cache_dir_for(&self, link: &str) -> PathBuf {
        let base = match &self.config.cache_dir {
            Some(dir) => dir.clone(),
            None => self
                .db_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(".git-cache"),
        };
        base.join(short_hash(link))
    }
}

#[async_trait]
impl Connector for GitConnector {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "GitHub repositories (shallow clone, one document per repository)"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    fn matches(&self, link: &str) -> bool {
        match reqwest::Url::parse(link) {
            Ok(url) => {
                matches!(url.scheme(), "https" | "http")
                    && matches!(url.host_str(), Some("github.com") | Some("www.github.com"))
            }
            Err(_) => false,
        }
    }

    async fn fetch(&self, link: &str, author: &Author) -> Result<RawContent> {
        let dest = self.cache_dir_for(link);
        let url = link.to_string();
        let ignore = self.config.ignore.clone();
        let author = author.clone();

        tokio::task::spawn_blocking(move || {
            sync_clone(&url, &dest)?;
            let raw = collect_tree(&dest, &ignore, &author)?;
            tracing::info!(
                link = %url,
                repo = repo_name(&url),
                files = raw.content.len(),
                "repository collected"
            );
            Ok::<_, anyhow::Error>(raw)
        })
        .await
        .context("git worker panicked")?
    }
}

/// Last path segment of a repository link, without `.git`.
pub fn repo_name(link: &str) -> &str {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(link)
        .trim_end_matches(".git")
}

fn sync_clone(url: &str, dest: &Path) -> Result<()> {
    if dest.join(".git").exists() {
        git_refresh(dest)
    } else {
        git_clone(url, dest)
    }
}

fn git_clone(url: &str, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create cache directory: {}", dest.display()))?;

    let output = Command::new("git")
        .args(["clone", "--depth", "1"])
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }
    Ok(())
}

fn git_refresh(repo_dir: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["fetch", "--depth", "1", "origin", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git fetch'")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git fetch failed: {}", stderr.trim());
    }

    let output = Command::new("git")
        .args(["reset", "--hard", "FETCH_HEAD"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git reset'")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git reset failed: {}", stderr.trim());
    }
    Ok(())
}

fn is_ignored(relative: &Path, ignore: &[String]) -> bool {
    relative.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        ignore.iter().any(|i| part == i.as_str() || part.ends_with(i.as_str()))
    })
}

/// Walk `root` into a repository [`RawContent`] keyed by relative path.
pub fn collect_tree(root: &Path, ignore: &[String], author: &Author) -> Result<RawContent> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        let relative = e.path().strip_prefix(root).unwrap_or(e.path());
        relative.as_os_str().is_empty() || !is_ignored(relative, ignore)
    });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        match std::fs::read_to_string(path) {
            Ok(text) => files.push((relative.to_string_lossy().to_string(), text)),
            Err(e) => tracing::debug!(path = %relative.display(), error = %e, "skipping unreadable file"),
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    let mut raw = RawContent::new("github", author);
    raw.content = files;
    Ok(raw)
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn ignore() -> Vec<String> {
        Config::with_db_path("x.sqlite").connectors.git.ignore
    }

    #[test]
    fn test_collect_tree_skips_ignored() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref").unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/install.md"), "Run docker compose").unwrap();
        std::fs::write(root.join("README.md"), "Hummingbot").unwrap();
        std::fs::write(root.join("Cargo.lock"), "lock").unwrap();
        std::fs::write(root.join("pyproject.toml"), "[x]").unwrap();
        std::fs::write(root.join("logo.png"), [0xffu8, 0xd8, 0x00, 0x9f]).unwrap();

        let raw = collect_tree(root, &ignore(), &Author::anonymous()).unwrap();
        let paths: Vec<&str> = raw.content.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "docs/install.md"]);
        assert_eq!(raw.platform, "github");
        assert_eq!(raw.field("docs/install.md"), Some("Run docker compose"));
    }

    #[test]
    fn test_matches_github_only() {
        let c = GitConnector::new(GitConnectorConfig::default(), PathBuf::from("db.sqlite"));
        assert!(c.matches("https://github.com/hummingbot/hummingbot"));
        assert!(!c.matches("https://gitlab.com/x/y"));
        assert!(!c.matches("not a url"));
    }

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://github.com/hummingbot/hummingbot/"), "hummingbot");
        assert_eq!(repo_name("https://github.com/org/tool.git"), "tool");
    }

    #[test]
    fn test_cache_dir_defaults_next_to_db() {
        let c = GitConnector::new(
            GitConnectorConfig::default(),
            PathBuf::from("/var/wiz/wiz.sqlite"),
        );
        let dir = c.cache_dir_for("https://github.com/a/b");
        assert!(dir.starts_with("/var/wiz/.git-cache"));
        assert_eq!(dir, c.cache_dir_for("https://github.com/a/b"));
    }
}
