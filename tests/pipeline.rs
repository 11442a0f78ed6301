//! End-to-end ingestion: connectors, knowledge base, reindexing and the
//! SQLite store, with a deterministic embedder.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use wiz_harness::chunk::SegmentParams;
use wiz_harness::config::{Config, FilesystemConnectorConfig, ReindexOrder};
use wiz_harness::connectors::article::ArticleConnector;
use wiz_harness::connectors::filesystem::FilesystemConnector;
use wiz_harness::connectors::{dispatch, ConnectorRegistry};
use wiz_harness::embedding::{EmbedderAdapter, EmbeddingProvider};
use wiz_harness::knowledge_base::{self, KbFilter};
use wiz_harness::models::{
    Author, DocumentFilter, RawContent, SourceDocument, SourceKind, VectorFilter,
};
use wiz_harness::reindex::Reindexer;
use wiz_harness::store::memory::InMemoryStore;
use wiz_harness::store::sqlite::SqliteStore;
use wiz_harness::store::{DocumentStore, VectorStore};
use wiz_harness::testing::HashEmbedder;

const DIMS: usize = 64;

fn embedder() -> EmbedderAdapter {
    EmbedderAdapter::new(Arc::new(HashEmbedder::new(DIMS)), 256, 16)
}

fn article(link: &str, content: &str) -> SourceDocument {
    let raw = RawContent::new("docs.hummingbot.org", &Author::from_name(Some("Ada")))
        .with_field("Title", "Guide")
        .with_field("Content", content);
    SourceDocument::new(SourceKind::Article, link, raw)
}

async fn sqlite_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let config = Config::with_db_path(tmp.path().join("data").join("wiz.sqlite"));
    Arc::new(SqliteStore::open(&config).await.unwrap())
}

fn source_filter(id: &str) -> VectorFilter {
    VectorFilter {
        source_document_id: Some(id.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sqlite_reindex_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let reindexer = Reindexer::new(
        store.clone(),
        embedder(),
        SegmentParams::default(),
        ReindexOrder::GenerateFirst,
    );
    let doc = article(
        "https://docs.hummingbot.org/installation/docker",
        "Pull the image.\n\n---\n\nStart the stack with docker compose up -d.",
    );

    let first = reindexer.reindex(&doc).await.unwrap();
    let mut ids_before = store.ids_for_source(&doc.id).await.unwrap();
    let second = reindexer.reindex(&doc).await.unwrap();
    let mut ids_after = store.ids_for_source(&doc.id).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 2);
    assert_eq!(second.deleted, 0);
    ids_before.sort();
    ids_after.sort();
    assert_eq!(ids_before, ids_after);
    assert_eq!(store.count(Some(&source_filter(&doc.id))).await.unwrap(), 2);
}

#[tokio::test]
async fn test_reindex_touches_only_its_own_source() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let reindexer = Reindexer::new(
        store.clone(),
        embedder(),
        SegmentParams::default(),
        ReindexOrder::GenerateFirst,
    );

    let a = article("https://example.org/a", "alpha one\n\n---\n\nalpha two");
    let b = article("https://example.org/b", "bravo one\n\n---\n\nbravo two");
    reindexer.reindex(&a).await.unwrap();
    reindexer.reindex(&b).await.unwrap();
    let b_ids = store.ids_for_source(&b.id).await.unwrap();

    let a2 = article("https://example.org/a", "alpha rewritten in a single section");
    let report = reindexer.reindex(&a2).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.deleted, 2);

    assert_eq!(store.ids_for_source(&a.id).await.unwrap().len(), 1);
    let mut b_after = store.ids_for_source(&b.id).await.unwrap();
    let mut b_before = b_ids;
    b_after.sort();
    b_before.sort();
    assert_eq!(b_before, b_after);
}

#[tokio::test]
async fn test_search_ranks_matching_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let emb = embedder();
    let reindexer = Reindexer::new(
        store.clone(),
        emb.clone(),
        SegmentParams::default(),
        ReindexOrder::DeleteFirst,
    );

    reindexer
        .reindex(&article(
            "https://example.org/mixed",
            "anaconda environment setup on macos\n\n---\n\ndocker compose pull and up",
        ))
        .await
        .unwrap();

    let query = emb.embed_query("docker compose up").await.unwrap();
    let hits = store.search(&query, None, 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].content.contains("docker"));
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].metadata["kind"], "article");
    assert_eq!(hits[0].metadata["embedding_size"], DIMS);
}

#[tokio::test]
async fn test_sqlite_document_store_upserts_by_link() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;

    let first = store
        .save(article("https://example.org/a", "version one"))
        .await
        .unwrap();
    let second = store
        .save(article("https://example.org/a", "version two"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let all = store.bulk_find(&DocumentFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    let found = store
        .find(&DocumentFilter::by_link(SourceKind::Article, "https://example.org/a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.raw_content().field("Content"), Some("version two"));
}

/// Fails any batch containing the word `poison`.
struct PickyEmbedder(HashEmbedder);

#[async_trait]
impl EmbeddingProvider for PickyEmbedder {
    fn model_name(&self) -> &str {
        "picky"
    }
    fn dims(&self) -> usize {
        self.0.dims()
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            bail!("model rejected input");
        }
        self.0.embed_texts(texts).await
    }
}

fn write_entry(root: &std::path::Path, file: &str, id: &str, category: &str, body: &str) {
    fs::write(
        root.join(file),
        format!(
            "+++\nid = \"{}\"\ntitle = \"{}\"\ncategories = [\"{}\"]\n+++\n{}\n",
            id, id, category, body
        ),
    )
    .unwrap();
}

#[tokio::test]
async fn test_kb_sync_isolates_failing_entries() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_entry(root, "a.md", "kb-a", "Installation", "docker compose install steps");
    write_entry(root, "b.md", "kb-b", "Installation", "this entry contains poison");
    write_entry(root, "c.md", "kb-c", "Installation", "anaconda source install steps");
    write_entry(root, "d.md", "kb-d", "Configs", "exchange api keys");
    fs::write(root.join("e.md"), "+++\ntitle = \"no id\"\n+++\nbody\n").unwrap();

    let store = Arc::new(InMemoryStore::new());
    let reindexer = Reindexer::new(
        store.clone(),
        EmbedderAdapter::new(Arc::new(PickyEmbedder(HashEmbedder::new(DIMS))), 256, 16),
        SegmentParams::default(),
        ReindexOrder::GenerateFirst,
    );

    let report = knowledge_base::sync(
        root,
        &KbFilter::default(),
        &reindexer,
        store.as_ref(),
        false,
    )
    .await
    .unwrap();

    assert_eq!(report.found, 5);
    assert_eq!(report.synced, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 2);

    let a_id = SourceDocument::id_for(SourceKind::KnowledgeBase, "kb-a");
    let c_id = SourceDocument::id_for(SourceKind::KnowledgeBase, "kb-c");
    let sources: Vec<String> = store
        .records()
        .into_iter()
        .map(|r| r.source_document_id)
        .collect();
    assert!(sources.contains(&a_id));
    assert!(sources.contains(&c_id));
    assert!(sources.iter().all(|s| *s == a_id || *s == c_id));

    let record = store
        .records()
        .into_iter()
        .find(|r| r.source_document_id == a_id)
        .unwrap();
    assert_eq!(record.platform, "knowledge_base");
    assert_eq!(record.metadata["categories"][0], "Installation");
}

#[tokio::test]
async fn test_filesystem_dispatch_then_reindex() {
    let tmp = TempDir::new().unwrap();
    let docs_dir = tmp.path().join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("install.md"), "# Install\n\nRun docker compose up -d").unwrap();
    fs::write(docs_dir.join("notes.txt"), "Anaconda needs WSL on Windows").unwrap();
    fs::write(docs_dir.join("logo.png"), "not really a png").unwrap();

    let mut registry = ConnectorRegistry::new(Box::new(ArticleConnector::new()));
    registry.register(Box::new(FilesystemConnector::new(
        FilesystemConnectorConfig::default(),
    )));

    let store = Arc::new(InMemoryStore::new());
    let link = docs_dir.to_string_lossy().to_string();
    let author = Author::from_name(Some("Ada"));

    let outcome = dispatch(&registry, store.as_ref(), &link, &author, false)
        .await
        .unwrap();
    assert!(!outcome.was_skipped());
    let doc = outcome.document().clone();
    assert_eq!(doc.kind, SourceKind::Repository);
    assert_eq!(doc.platform, "filesystem");
    assert_eq!(doc.content.len(), 2);

    let reindexer = Reindexer::new(
        store.clone(),
        embedder(),
        SegmentParams::default(),
        ReindexOrder::GenerateFirst,
    );
    let report = reindexer.reindex(&doc).await.unwrap();
    assert!(report.inserted >= 1);
    assert!(store
        .records()
        .iter()
        .all(|r| r.author_full_name == "Ada" && r.source_document_id == doc.id));

    let again = dispatch(&registry, store.as_ref(), &link, &author, false)
        .await
        .unwrap();
    assert!(again.was_skipped());
    let forced = dispatch(&registry, store.as_ref(), &link, &author, true)
        .await
        .unwrap();
    assert!(!forced.was_skipped());
}
