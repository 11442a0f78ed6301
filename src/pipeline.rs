//! The document-to-chunks stage, shared by every source kind.
//!
//! ```text
//! SourceDocument ─▶ RawContent ─▶ normalize ─▶ segment ─▶ tag_chunks ─▶ Vec<Chunk>
//! ```
//!
//! [`prepare_chunks`] is pure; embedding and storage happen in
//! [`crate::reindex`].

use crate::chunk::{segment, SegmentParams};
use crate::models::{Chunk, SourceDocument};
use crate::normalize::normalize;
use crate::provenance::tag_chunks;

/// Metadata every chunk of `doc` carries, beyond identity and sizing.
pub fn source_tags(doc: &SourceDocument) -> serde_json::Map<String, serde_json::Value> {
    let mut tags = serde_json::Map::new();
    tags.insert("kind".into(), doc.kind.as_str().into());
    tags.insert("link".into(), doc.link.clone().into());
    if let Some(title) = &doc.title {
        tags.insert("title".into(), title.clone().into());
    }
    if let serde_json::Value::Object(extra) = &doc.metadata {
        for (k, v) in extra {
            tags.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    tags
}

/// Normalize, segment and tag one document.
pub fn prepare_chunks(doc: &SourceDocument, params: &SegmentParams) -> Vec<Chunk> {
    let cleaned = normalize(&doc.raw_content());
    let pieces = segment(&cleaned.text, params);
    tag_chunks(&doc.id, &cleaned, pieces, params, &source_tags(doc))
}
