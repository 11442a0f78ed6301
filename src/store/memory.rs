//! In-memory [`VectorStore`] and [`DocumentStore`] for tests and fakes.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over all stored records.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentFilter, SearchHit, SourceDocument, VectorFilter};

use super::{rank_records, DocumentStore, VectorStore};

pub struct InMemoryStore {
    records: RwLock<HashMap<String, ChunkRecord>>,
    docs: RwLock<HashMap<String, SourceDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of every stored record, ordered by id.
    pub fn records(&self) -> Vec<ChunkRecord> {
        let guard = match self.records.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<ChunkRecord> = guard.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn delete_by_source(&self, source_document_id: &str) -> Result<usize> {
        let mut records = self.records.write().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, r| r.source_document_id != source_document_id);
        Ok(before - records.len())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<usize> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(ids.iter().filter(|id| records.remove(*id).is_some()).count())
    }

    async fn bulk_upsert(&self, new_records: Vec<ChunkRecord>) -> Result<usize> {
        let mut records = self.records.write().map_err(poisoned)?;
        let n = new_records.len();
        for r in new_records {
            records.insert(r.id.clone(), r);
        }
        Ok(n)
    }

    async fn search(
        &self,
        query_vec: &[f32],
        filter: Option<&VectorFilter>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(rank_records(records.values(), query_vec, filter, top_k))
    }

    async fn count(&self, filter: Option<&VectorFilter>) -> Result<usize> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .count())
    }

    async fn ids_for_source(&self, source_document_id: &str) -> Result<Vec<String>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut ids: Vec<String> = records
            .values()
            .filter(|r| r.source_document_id == source_document_id)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(&self, filter: &DocumentFilter) -> Result<Option<SourceDocument>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut matching: Vec<&SourceDocument> = docs.values().filter(|d| filter.matches(d)).collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching.first().map(|d| (*d).clone()))
    }

    async fn bulk_find(&self, filter: &DocumentFilter) -> Result<Vec<SourceDocument>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut out: Vec<SourceDocument> = docs
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn save(&self, doc: SourceDocument) -> Result<SourceDocument> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        // the id is derived from (kind, link), so keying by id is the upsert key
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }
}
