use anyhow::Result;
use sqlx::SqlitePool;

/// Create the document and chunk-record tables if they do not exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            link TEXT NOT NULL,
            platform TEXT NOT NULL,
            author_id TEXT NOT NULL,
            author_full_name TEXT NOT NULL,
            title TEXT,
            content_json TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            UNIQUE(kind, link)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_records (
            id TEXT PRIMARY KEY,
            source_document_id TEXT NOT NULL,
            content TEXT NOT NULL,
            platform TEXT NOT NULL,
            author_id TEXT NOT NULL,
            author_full_name TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_records_source ON chunk_records(source_document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(kind)")
        .execute(pool)
        .await?;

    Ok(())
}
