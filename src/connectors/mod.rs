//! Source connectors.
//!
//! A connector turns a link into [`RawContent`]. The
//! [`ConnectorRegistry`] picks one per link by checking matchers in
//! registration order and falls back to the article connector:
//!
//! ```text
//! link ──▶ git?  (github.com)      ──▶ GitConnector         ──▶ Repository
//!      ──▶ filesystem? (file://, path) ──▶ FilesystemConnector ──▶ Repository
//!      ──▶ fallback                ──▶ ArticleConnector     ──▶ Article
//! ```
//!
//! [`dispatch`] wraps the lookup with the document store: a link that is
//! already stored is skipped unless `force` is set.

pub mod article;
pub mod filesystem;
pub mod git;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Author, DocumentFilter, RawContent, SourceDocument, SourceKind};
use crate::store::{find_or_none, DocumentStore};

pub use registry::ConnectorRegistry;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Short identifier shown by `wiz sources` (e.g. `"git"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Kind of [`SourceDocument`] this connector produces.
    fn kind(&self) -> SourceKind;

    /// Whether this connector handles `link`.
    fn matches(&self, link: &str) -> bool;

    async fn fetch(&self, link: &str, author: &Author) -> Result<RawContent>;
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Fetched and saved.
    Stored(SourceDocument),
    /// Already in the document store; nothing fetched.
    Skipped(SourceDocument),
}

impl DispatchOutcome {
    pub fn document(&self) -> &SourceDocument {
        match self {
            DispatchOutcome::Stored(d) | DispatchOutcome::Skipped(d) => d,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, DispatchOutcome::Skipped(_))
    }
}

/// Fetch `link` with the matching connector and save the result.
///
/// # Errors
///
/// Fetch failures and document-store write failures propagate.
pub async fn dispatch(
    registry: &ConnectorRegistry,
    docs: &dyn DocumentStore,
    link: &str,
    author: &Author,
    force: bool,
) -> Result<DispatchOutcome> {
    let connector = registry.resolve(link);
    let kind = connector.kind();

    if !force {
        if let Some(existing) = find_or_none(docs, &DocumentFilter::by_link(kind, link)).await {
            tracing::info!(link, connector = connector.name(), "already ingested; skipping");
            return Ok(DispatchOutcome::Skipped(existing));
        }
    }

    tracing::info!(link, connector = connector.name(), "fetching");
    let raw = connector.fetch(link, author).await?;
    let saved = docs.save(SourceDocument::new(kind, link, raw)).await?;
    Ok(DispatchOutcome::Stored(saved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingConnector {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        fn name(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "test connector"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Article
        }
        fn matches(&self, _link: &str) -> bool {
            true
        }
        async fn fetch(&self, link: &str, author: &Author) -> Result<RawContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawContent::new("test", author).with_field("Content", format!("body of {}", link)))
        }
    }

    fn registry(calls: Arc<AtomicUsize>) -> ConnectorRegistry {
        ConnectorRegistry::new(Box::new(CountingConnector { calls }))
    }

    #[tokio::test]
    async fn test_dispatch_skips_stored_links() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(calls.clone());
        let store = InMemoryStore::new();
        let author = Author::anonymous();

        let first = dispatch(&reg, &store, "https://blog.example/a", &author, false)
            .await
            .unwrap();
        assert!(!first.was_skipped());

        let second = dispatch(&reg, &store, "https://blog.example/a", &author, false)
            .await
            .unwrap();
        assert!(second.was_skipped());
        assert_eq!(second.document().id, first.document().id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_force_refetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = registry(calls.clone());
        let store = InMemoryStore::new();
        let author = Author::anonymous();

        dispatch(&reg, &store, "https://blog.example/a", &author, false)
            .await
            .unwrap();
        let forced = dispatch(&reg, &store, "https://blog.example/a", &author, true)
            .await
            .unwrap();
        assert!(!forced.was_skipped());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
