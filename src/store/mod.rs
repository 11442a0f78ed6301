//! Storage boundary for the pipeline.
//!
//! Two traits describe the opaque services the core talks to:
//!
//! - [`VectorStore`] holds [`ChunkRecord`]s and answers nearest-neighbour
//!   queries with payload filtering.
//! - [`DocumentStore`] holds [`SourceDocument`]s with upsert semantics keyed
//!   by `(kind, link)`.
//!
//! Both are implemented by [`memory::InMemoryStore`] (tests, fakes) and
//! [`sqlite::SqliteStore`] (the CLI and server). Implementations must be
//! `Send + Sync` and are shared behind `Arc<dyn …>` by the composition root.
//!
//! Writes always propagate failures. Read helpers [`find_or_none`] and
//! [`search_or_empty`] log and degrade instead, for callers on the read path.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentFilter, SearchHit, SourceDocument, VectorFilter};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Remove every record whose `source_document_id` matches. Returns the count removed.
    async fn delete_by_source(&self, source_document_id: &str) -> Result<usize>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete_ids(&self, ids: &[String]) -> Result<usize>;

    /// Insert or overwrite records by id.
    async fn bulk_upsert(&self, records: Vec<ChunkRecord>) -> Result<usize>;

    /// Top `top_k` records by cosine similarity, best first.
    async fn search(
        &self,
        query_vec: &[f32],
        filter: Option<&VectorFilter>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self, filter: Option<&VectorFilter>) -> Result<usize>;

    /// Ids currently stored for one source document.
    async fn ids_for_source(&self, source_document_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, filter: &DocumentFilter) -> Result<Option<SourceDocument>>;

    async fn bulk_find(&self, filter: &DocumentFilter) -> Result<Vec<SourceDocument>>;

    /// Upsert keyed by `(kind, link)`; returns the stored document.
    async fn save(&self, doc: SourceDocument) -> Result<SourceDocument>;
}

/// [`DocumentStore::find`] for read paths: failures are logged and read as "absent".
pub async fn find_or_none(store: &dyn DocumentStore, filter: &DocumentFilter) -> Option<SourceDocument> {
    match store.find(filter).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, ?filter, "document lookup failed");
            None
        }
    }
}

/// [`VectorStore::search`] for read paths: failures are logged and read as "no hits".
pub async fn search_or_empty(
    store: &dyn VectorStore,
    query_vec: &[f32],
    filter: Option<&VectorFilter>,
    top_k: usize,
) -> Vec<SearchHit> {
    match store.search(query_vec, filter, top_k).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %e, "vector search failed");
            Vec::new()
        }
    }
}

/// Rank `records` against `query_vec`, keeping those matching `filter`.
pub(crate) fn rank_records<'a>(
    records: impl Iterator<Item = &'a ChunkRecord>,
    query_vec: &[f32],
    filter: Option<&VectorFilter>,
    top_k: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = records
        .filter(|r| filter.map_or(true, |f| f.matches(r)))
        .map(|r| {
            SearchHit::from_record(r, crate::embedding::cosine_similarity(query_vec, &r.embedding))
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits
}
