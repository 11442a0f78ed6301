//! Chunk identity and provenance tagging.
//!
//! Every chunk id is a UUID v5 over `"{source_document_id}:{sha256(content)}"`,
//! so re-segmenting unchanged content reproduces the same ids and a
//! reindex overwrites rather than duplicates. Identical pieces within one
//! source collapse to their first occurrence.

use std::collections::HashSet;

use crate::chunk::SegmentParams;
use crate::models::{content_hash, deterministic_id, Chunk, CleanedText, Provenance};

/// Stable id of a chunk with `content` inside `source_document_id`.
pub fn chunk_id(source_document_id: &str, content: &str) -> String {
    deterministic_id(&format!("{}:{}", source_document_id, content_hash(content)))
}

/// Attach identity, ordering and provenance to segmented pieces.
///
/// `tags` are source-specific metadata (e.g. `kind`, `link`, categories)
/// copied onto every chunk.
pub fn tag_chunks(
    source_document_id: &str,
    cleaned: &CleanedText,
    pieces: Vec<String>,
    params: &SegmentParams,
    tags: &serde_json::Map<String, serde_json::Value>,
) -> Vec<Chunk> {
    let provenance = Provenance {
        platform: cleaned.platform.clone(),
        author_id: cleaned.author_id.clone(),
        author_full_name: cleaned.author_full_name.clone(),
    };

    let mut seen = HashSet::new();
    let mut chunks = Vec::with_capacity(pieces.len());

    for content in pieces {
        let hash = content_hash(&content);
        if !seen.insert(hash.clone()) {
            continue;
        }

        let mut metadata = tags.clone();
        metadata.insert("chunk_index".into(), chunks.len().into());
        metadata.insert("content_hash".into(), hash.into());
        metadata.insert("chunk_size".into(), params.chunk_size.into());
        metadata.insert("chunk_overlap".into(), params.chunk_overlap.into());

        chunks.push(Chunk {
            id: chunk_id(source_document_id, &content),
            chunk_index: chunks.len(),
            content,
            source_document_id: source_document_id.to_string(),
            metadata,
            provenance: provenance.clone(),
        });
    }

    chunks
}
