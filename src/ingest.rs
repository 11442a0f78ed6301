//! CLI-facing ingestion commands.
//!
//! Each `run_*` function opens what it needs from the config, does one
//! job and prints `key: value` lines followed by `ok`.

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::chunk::SegmentParams;
use crate::config::Config;
use crate::connectors::{dispatch, ConnectorRegistry};
use crate::embedding::EmbedderAdapter;
use crate::knowledge_base::{self, KbFilter};
use crate::models::Author;
use crate::reindex::Reindexer;
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;

/// Store, embedder and reindexer wired from one config.
pub struct Pipeline {
    pub store: Arc<SqliteStore>,
    pub embedder: EmbedderAdapter,
    pub reindexer: Reindexer,
}

impl Pipeline {
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(config).await?);
        let embedder = EmbedderAdapter::from_config(&config.embedding)?;
        let reindexer = Reindexer::new(
            store.clone(),
            embedder.clone(),
            SegmentParams::from_config(config),
            config.reindex.order,
        );
        Ok(Self {
            store,
            embedder,
            reindexer,
        })
    }
}

pub async fn run_init(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    store.close().await;
    println!("database: {}", config.db.path.display());
    println!("ok");
    Ok(())
}

pub async fn run_kb_sync(
    config: &Config,
    categories: Vec<String>,
    include_deprecated: bool,
    dry_run: bool,
) -> Result<()> {
    let kb = config
        .knowledge_base
        .as_ref()
        .context("No [knowledge_base] section in config")?;
    if !kb.root.exists() {
        bail!("Knowledge base root does not exist: {}", kb.root.display());
    }

    let filter = KbFilter::for_sync(kb, &categories, include_deprecated)?;

    let pipeline = Pipeline::open(config).await?;
    let report = knowledge_base::sync(
        &kb.root,
        &filter,
        &pipeline.reindexer,
        pipeline.store.as_ref(),
        dry_run,
    )
    .await?;

    println!("kb sync{}", if dry_run { " (dry-run)" } else { "" });
    println!("  found: {}", report.found);
    println!("  synced: {}", report.synced);
    println!("  skipped: {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("  chunks: {}", report.chunks);
    println!("ok");

    pipeline.store.close().await;
    Ok(())
}

pub async fn run_ingest(
    config: &Config,
    link: &str,
    author: Option<String>,
    force: bool,
) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let registry = ConnectorRegistry::from_config(config);
    let author = Author::from_name(author.as_deref());

    let outcome = dispatch(&registry, pipeline.store.as_ref(), link, &author, force).await?;
    let doc = outcome.document();

    println!("ingest {}", link);
    println!("  document: {}", doc.id);
    println!("  kind: {}", doc.kind.as_str());
    println!("  platform: {}", doc.platform);
    if outcome.was_skipped() {
        println!("  skipped: already ingested (use --force to refetch)");
    } else {
        let report = pipeline.reindexer.reindex(doc).await?;
        println!("  chunks inserted: {}", report.inserted);
        println!("  chunks deleted: {}", report.deleted);
    }
    println!("ok");

    pipeline.store.close().await;
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let query_vec = pipeline.embedder.embed_query(query).await?;
    let hits = pipeline.store.search(&query_vec, None, limit).await?;

    if hits.is_empty() {
        println!("No results.");
    }
    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit.content.chars().take(160).collect();
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.metadata
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or(&hit.source_document_id),
            hit.platform
        );
        println!("   {}", preview.replace('\n', " "));
    }

    pipeline.store.close().await;
    Ok(())
}
