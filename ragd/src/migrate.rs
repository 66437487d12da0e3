//! Database schema migrations (idempotent).
//!
//! One SQLite file backs all three stores:
//! - `documents` — [`MetadataStore`](ragd_core::store::MetadataStore): one row
//!   per document, `metadata_json` holding the versioned `DocumentMetadata`.
//! - `chunk_vectors` — [`VectorStore`](ragd_core::store::VectorStore): one row
//!   per chunk, embedding stored as a BLOB (little-endian f32, see
//!   `ragd_core::embedding::vec_to_blob`).
//! - `chunks` + `chunks_fts` — [`KeywordStore`](ragd_core::store::KeywordStore):
//!   chunk content plus an FTS5 shadow table for BM25 search.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id              TEXT PRIMARY KEY,
            source_path     TEXT NOT NULL,
            content_hash    TEXT NOT NULL,
            ingestion_date  TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            metadata_json   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Not unique: skip_duplicates is an ingestion-time policy decision, not
    // a storage invariant — the same content re-indexed under a different
    // source_path is a legitimate second row.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(json_extract(metadata_json, '$.project'))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_source_path ON documents(json_extract(metadata_json, '$.source_path'))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_source_hash ON documents(json_extract(metadata_json, '$.source_hash'))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_ingestion_date ON documents(json_extract(metadata_json, '$.ingestion_date'))",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id        TEXT PRIMARY KEY,
            document_id     TEXT NOT NULL,
            content         TEXT NOT NULL,
            metadata_json   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;

    let fts_exists: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='chunks_fts'")
            .fetch_optional(pool)
            .await?;
    if fts_exists.is_none() {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id        TEXT PRIMARY KEY,
            document_id     TEXT NOT NULL,
            content         TEXT NOT NULL,
            embedding       BLOB NOT NULL,
            metadata_json   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_document_id ON chunk_vectors(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
