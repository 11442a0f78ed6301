//! Retriever: top-K nearest chunks, minus those already surfaced.
//!
//! Failures on this path (query embedding, vector search) are logged and
//! read as "nothing new", never raised. Returning an empty set is normal
//! once every top-K hit has been seen.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::EmbedderAdapter;
use crate::models::{SearchHit, VectorFilter};
use crate::store::{search_or_empty, VectorStore};

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: EmbedderAdapter,
    top_k: usize,
    filter: Option<VectorFilter>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: EmbedderAdapter, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
            filter: None,
        }
    }

    /// Restrict every search to records matching `filter`.
    pub fn with_filter(mut self, filter: VectorFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Hits for `query` whose ids are not in `already_seen`, best first.
    ///
    /// The caller merges the returned ids into its seen set.
    pub async fn retrieve(&self, query: &str, already_seen: &BTreeSet<String>) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let query_vec = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed; retrieving nothing");
                return Vec::new();
            }
        };

        let hits = search_or_empty(
            self.store.as_ref(),
            &query_vec,
            self.filter.as_ref(),
            self.top_k,
        )
        .await;

        let mut fresh = BTreeSet::new();
        hits.into_iter()
            .filter(|h| !already_seen.contains(&h.id) && fresh.insert(h.id.clone()))
            .collect()
    }
}
