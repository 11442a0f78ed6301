//! SQLite-backed [`VectorStore`] and [`DocumentStore`].
//!
//! Vectors are stored as little-endian `f32` BLOBs (see
//! [`crate::embedding::vec_to_blob`]) and ranked brute-force by cosine
//! similarity; record payloads live alongside in `chunk_records`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::migrate;
use crate::models::{
    Author, ChunkRecord, DocumentFilter, SearchHit, SourceDocument, SourceKind, VectorFilter,
};

use super::{rank_records, DocumentStore, VectorStore};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ChunkRecord> {
    let metadata_json: String = row.get("metadata_json");
    let blob: Vec<u8> = row.get("embedding");
    Ok(ChunkRecord {
        id: row.get("id"),
        content: row.get("content"),
        source_document_id: row.get("source_document_id"),
        platform: row.get("platform"),
        author_id: row.get("author_id"),
        author_full_name: row.get("author_full_name"),
        embedding: blob_to_vec(&blob),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
    })
}

fn row_to_document(row: &SqliteRow) -> Result<SourceDocument> {
    let kind: String = row.get("kind");
    let content_json: String = row.get("content_json");
    let metadata_json: String = row.get("metadata_json");

    Ok(SourceDocument {
        id: row.get("id"),
        kind: SourceKind::parse(&kind)
            .with_context(|| format!("unknown document kind in store: {}", kind))?,
        link: row.get("link"),
        platform: row.get("platform"),
        author: Author {
            id: row.get("author_id"),
            full_name: row.get("author_full_name"),
        },
        title: row.get("title"),
        content: serde_json::from_str(&content_json)
            .with_context(|| "corrupt content_json in documents table")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn delete_by_source(&self, source_document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunk_records WHERE source_document_id = ?")
            .bind(source_document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM chunk_records WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn bulk_upsert(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let n = records.len();

        for r in records {
            sqlx::query(
                r#"
                INSERT INTO chunk_records
                    (id, source_document_id, content, platform, author_id, author_full_name,
                     metadata_json, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_document_id = excluded.source_document_id,
                    content = excluded.content,
                    platform = excluded.platform,
                    author_id = excluded.author_id,
                    author_full_name = excluded.author_full_name,
                    metadata_json = excluded.metadata_json,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&r.id)
            .bind(&r.source_document_id)
            .bind(&r.content)
            .bind(&r.platform)
            .bind(&r.author_id)
            .bind(&r.author_full_name)
            .bind(r.metadata.to_string())
            .bind(r.embedding.len() as i64)
            .bind(vec_to_blob(&r.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(n)
    }

    async fn search(
        &self,
        query_vec: &[f32],
        filter: Option<&VectorFilter>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            "SELECT id, source_document_id, content, platform, author_id, author_full_name, metadata_json, embedding FROM chunk_records WHERE dims = ?",
        )
        .bind(query_vec.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(rank_records(records.iter(), query_vec, filter, top_k))
    }

    async fn count(&self, filter: Option<&VectorFilter>) -> Result<usize> {
        let source = filter.and_then(|f| f.source_document_id.clone());
        let platform = filter.and_then(|f| f.platform.clone());
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chunk_records
            WHERE (?1 IS NULL OR source_document_id = ?1)
              AND (?2 IS NULL OR platform = ?2)
            "#,
        )
        .bind(source)
        .bind(platform)
        .fetch_one(&self.pool)
        .await?;
        Ok(n as usize)
    }

    async fn ids_for_source(&self, source_document_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM chunk_records WHERE source_document_id = ? ORDER BY id",
        )
        .bind(source_document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find(&self, filter: &DocumentFilter) -> Result<Option<SourceDocument>> {
        Ok(self.bulk_find(filter).await?.into_iter().next())
    }

    async fn bulk_find(&self, filter: &DocumentFilter) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, link, platform, author_id, author_full_name, title,
                   content_json, metadata_json, updated_at
            FROM documents
            WHERE (?1 IS NULL OR id = ?1)
              AND (?2 IS NULL OR kind = ?2)
              AND (?3 IS NULL OR link = ?3)
            ORDER BY id
            "#,
        )
        .bind(filter.id.clone())
        .bind(filter.kind.map(|k| k.as_str().to_string()))
        .bind(filter.link.clone())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn save(&self, doc: SourceDocument) -> Result<SourceDocument> {
        let content_json = serde_json::to_string(&doc.content)?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, kind, link, platform, author_id, author_full_name, title,
                 content_json, metadata_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, link) DO UPDATE SET
                platform = excluded.platform,
                author_id = excluded.author_id,
                author_full_name = excluded.author_full_name,
                title = excluded.title,
                content_json = excluded.content_json,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(doc.kind.as_str())
        .bind(&doc.link)
        .bind(&doc.platform)
        .bind(&doc.author.id)
        .bind(&doc.author.full_name)
        .bind(&doc.title)
        .bind(content_json)
        .bind(doc.metadata.to_string())
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(doc)
    }
}
