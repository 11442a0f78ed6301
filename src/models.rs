//! Core data models used throughout the pipeline.
//!
//! These types follow content from a connector through normalization,
//! segmentation and embedding into the vector store:
//!
//! ```text
//! RawContent ─▶ CleanedText ─▶ Chunk ─▶ EmbeddedChunk ─▶ ChunkRecord
//! ```
//!
//! [`SourceDocument`] is the document-store view of an ingested item and
//! exclusively owns the chunks derived from it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for every deterministic identifier this crate derives.
pub const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b7d_4e08_a5c4_2f81_d93e_b710);

/// Display name used when a source has no known author.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous User";

/// Derive a stable UUID string from arbitrary key material.
pub fn deterministic_id(key: &str) -> String {
    Uuid::new_v5(&ID_NAMESPACE, key.as_bytes()).to_string()
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub full_name: String,
}

impl Author {
    /// Author identity derived from the full name, so repeated ingests of the
    /// same author map to the same id.
    pub fn from_name(full_name: Option<&str>) -> Self {
        let full_name = full_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(ANONYMOUS_AUTHOR)
            .to_string();
        Self {
            id: deterministic_id(&format!("author:{}", full_name)),
            full_name,
        }
    }

    pub fn anonymous() -> Self {
        Self::from_name(None)
    }
}

/// Raw item produced by a connector before normalization.
///
/// `content` keeps named sections in insertion order (e.g. `Title`, then
/// `Content`); the normalizer joins them in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub content: Vec<(String, String)>,
    pub platform: String,
    pub author_id: String,
    pub author_full_name: String,
}

impl RawContent {
    pub fn new(platform: impl Into<String>, author: &Author) -> Self {
        Self {
            content: Vec::new(),
            platform: platform.into(),
            author_id: author.id.clone(),
            author_full_name: author.full_name.clone(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.content.push((name.into(), value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.content
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Normalized single-blob text with the provenance of its [`RawContent`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedText {
    pub text: String,
    pub platform: String,
    pub author_id: String,
    pub author_full_name: String,
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub platform: String,
    pub author_id: String,
    pub author_full_name: String,
}

/// A bounded slice of one source document's normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source_document_id: String,
    pub chunk_index: usize,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub provenance: Provenance,
}

/// Identity of the embedding model that produced a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    pub model_id: String,
    pub dims: usize,
    pub max_input_length: usize,
}

/// A [`Chunk`] plus its vector. `embedding.len() == model.dims` always.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub model: EmbeddingModelInfo,
}

/// Persisted layout of one embedded chunk in a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    pub source_document_id: String,
    pub platform: String,
    pub author_id: String,
    pub author_full_name: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

impl From<EmbeddedChunk> for ChunkRecord {
    fn from(ec: EmbeddedChunk) -> Self {
        let mut metadata = ec.chunk.metadata;
        metadata.insert(
            "embedding_model_id".into(),
            serde_json::Value::from(ec.model.model_id),
        );
        metadata.insert(
            "embedding_size".into(),
            serde_json::Value::from(ec.model.dims),
        );
        metadata.insert(
            "max_input_length".into(),
            serde_json::Value::from(ec.model.max_input_length),
        );
        Self {
            id: ec.chunk.id,
            content: ec.chunk.content,
            source_document_id: ec.chunk.source_document_id,
            platform: ec.chunk.provenance.platform,
            author_id: ec.chunk.provenance.author_id,
            author_full_name: ec.chunk.provenance.author_full_name,
            embedding: ec.embedding,
            metadata: serde_json::Value::Object(metadata),
        }
    }
}

/// A ranked vector-store result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub source_document_id: String,
    pub platform: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

impl SearchHit {
    pub fn from_record(record: &ChunkRecord, score: f32) -> Self {
        Self {
            id: record.id.clone(),
            content: record.content.clone(),
            source_document_id: record.source_document_id.clone(),
            platform: record.platform.clone(),
            score,
            metadata: record.metadata.clone(),
        }
    }
}

/// Payload filter for vector search. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub source_document_id: Option<String>,
    pub platform: Option<String>,
}

impl VectorFilter {
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        self.source_document_id
            .as_ref()
            .map_or(true, |id| &record.source_document_id == id)
            && self
                .platform
                .as_ref()
                .map_or(true, |p| &record.platform == p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Article,
    Repository,
    KnowledgeBase,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Article => "article",
            SourceKind::Repository => "repository",
            SourceKind::KnowledgeBase => "knowledge_base",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(SourceKind::Article),
            "repository" => Some(SourceKind::Repository),
            "knowledge_base" => Some(SourceKind::KnowledgeBase),
            _ => None,
        }
    }
}

/// Document-store view of an ingested item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable source identifier; every derived chunk carries it.
    pub id: String,
    pub kind: SourceKind,
    /// URL, path, or knowledge-base entry id.
    pub link: String,
    pub platform: String,
    pub author: Author,
    pub title: Option<String>,
    pub content: Vec<(String, String)>,
    pub metadata: serde_json::Value,
    pub updated_at: i64,
}

impl SourceDocument {
    pub fn new(kind: SourceKind, link: impl Into<String>, raw: RawContent) -> Self {
        let link = link.into();
        Self {
            id: Self::id_for(kind, &link),
            kind,
            title: raw.field("Title").or_else(|| raw.field("title")).map(String::from),
            link,
            platform: raw.platform,
            author: Author {
                id: raw.author_id,
                full_name: raw.author_full_name,
            },
            content: raw.content,
            metadata: serde_json::json!({}),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The id a document of `kind` at `link` has, stored or not.
    pub fn id_for(kind: SourceKind, link: &str) -> String {
        deterministic_id(&format!("{}:{}", kind.as_str(), link))
    }

    pub fn raw_content(&self) -> RawContent {
        RawContent {
            content: self.content.clone(),
            platform: self.platform.clone(),
            author_id: self.author.id.clone(),
            author_full_name: self.author.full_name.clone(),
        }
    }
}

/// Document-store lookup. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub id: Option<String>,
    pub kind: Option<SourceKind>,
    pub link: Option<String>,
}

impl DocumentFilter {
    pub fn by_link(kind: SourceKind, link: &str) -> Self {
        Self {
            kind: Some(kind),
            link: Some(link.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, doc: &SourceDocument) -> bool {
        self.id.as_ref().map_or(true, |id| &doc.id == id)
            && self.kind.map_or(true, |k| doc.kind == k)
            && self.link.as_ref().map_or(true, |l| &doc.link == l)
    }
}
