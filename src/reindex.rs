//! Vector upsert coordinator.
//!
//! [`Reindexer::reindex`] replaces everything the vector store holds for
//! one source document with freshly computed chunks. After a successful
//! call the store holds exactly the chunks of the current version.
//!
//! # Ordering
//!
//! | `[reindex] order` | Steps | On embedding failure |
//! |-------------------|-------|----------------------|
//! | `generate-first` (default) | embed → upsert new → delete stale ids | old vectors stay live |
//! | `delete-first` | delete by source → embed → upsert | source has zero coverage until the next reindex |
//!
//! Chunk ids are deterministic, so in `generate-first` unchanged chunks are
//! overwritten in place and only ids absent from the new version are removed.
//!
//! Reindexes of the same source document are serialised; different
//! documents proceed concurrently.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::chunk::SegmentParams;
use crate::config::ReindexOrder;
use crate::embedding::EmbedderAdapter;
use crate::locks::KeyedLocks;
use crate::models::{Chunk, ChunkRecord, SourceDocument};
use crate::pipeline::prepare_chunks;
use crate::store::VectorStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    pub source_document_id: String,
    pub deleted: usize,
    pub inserted: usize,
}

#[derive(Clone)]
pub struct Reindexer {
    store: Arc<dyn VectorStore>,
    embedder: EmbedderAdapter,
    params: SegmentParams,
    order: ReindexOrder,
    locks: KeyedLocks,
}

impl Reindexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: EmbedderAdapter,
        params: SegmentParams,
        order: ReindexOrder,
    ) -> Self {
        Self {
            store,
            embedder,
            params,
            order,
            locks: KeyedLocks::new(),
        }
    }

    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    /// Segment, embed and store `doc`, replacing its previous chunks.
    ///
    /// # Errors
    ///
    /// Embedding and store write failures propagate to the caller.
    pub async fn reindex(&self, doc: &SourceDocument) -> Result<ReindexReport> {
        let chunks = prepare_chunks(doc, &self.params);
        self.reindex_chunks(&doc.id, chunks).await
    }

    pub async fn reindex_chunks(
        &self,
        source_document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<ReindexReport> {
        let guard = self.locks.acquire(source_document_id).await;

        let report = match self.order {
            ReindexOrder::GenerateFirst => self.generate_first(source_document_id, chunks).await,
            ReindexOrder::DeleteFirst => self.delete_first(source_document_id, chunks).await,
        };
        drop(guard);
        self.locks.cleanup_unused().await;
        report
    }

    async fn generate_first(
        &self,
        source_document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<ReindexReport> {
        let embedded = self.embedder.embed_chunks(chunks).await?;
        let records: Vec<ChunkRecord> = embedded.into_iter().map(ChunkRecord::from).collect();
        let new_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

        let stale: Vec<String> = self
            .store
            .ids_for_source(source_document_id)
            .await?
            .into_iter()
            .filter(|id| !new_ids.contains(id.as_str()))
            .collect();

        let inserted = self.store.bulk_upsert(records).await?;
        let deleted = self.store.delete_ids(&stale).await?;

        tracing::debug!(source_document_id, inserted, deleted, "reindexed (generate-first)");
        Ok(ReindexReport {
            source_document_id: source_document_id.to_string(),
            deleted,
            inserted,
        })
    }

    async fn delete_first(
        &self,
        source_document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<ReindexReport> {
        let deleted = self.store.delete_by_source(source_document_id).await?;

        let embedded = match self.embedder.embed_chunks(chunks).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(
                    source_document_id,
                    deleted,
                    error = %e,
                    "embedding failed after delete; source has no vectors until the next reindex"
                );
                return Err(e);
            }
        };

        let records: Vec<ChunkRecord> = embedded.into_iter().map(ChunkRecord::from).collect();
        let inserted = self.store.bulk_upsert(records).await?;

        tracing::debug!(source_document_id, inserted, deleted, "reindexed (delete-first)");
        Ok(ReindexReport {
            source_document_id: source_document_id.to_string(),
            deleted,
            inserted,
        })
    }
}
