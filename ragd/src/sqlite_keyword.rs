//! SQLite-backed [`KeywordStore`] using an FTS5 shadow table.
//!
//! `chunks` holds the authoritative row; `chunks_fts` is kept in lockstep
//! by hand (no `content=` external-content trigger) since `content` needs
//! independent metadata filtering that a trigger can't express cleanly.
//! `search` takes the FTS5 expression straight from
//! [`ragd_core::query::Fts5Transformer`] and runs it against `MATCH`.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use ragd_core::models::{BranchHit, KeywordRecord};
use ragd_core::store::{KeywordStore, VectorFilter};

pub struct SqliteKeywordStore {
    pool: SqlitePool,
}

impl SqliteKeywordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeywordStore for SqliteKeywordStore {
    async fn add(&self, records: &[KeywordRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            let metadata_json = serde_json::to_string(&r.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, document_id, content, metadata_json)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    content = excluded.content,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&r.chunk_id)
            .bind(&r.document_id)
            .bind(&r.content)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(&r.chunk_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, content) VALUES (?, ?, ?)")
                .bind(&r.chunk_id)
                .bind(&r.document_id)
                .bind(&r.content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        fts_expression: &str,
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id,
                   chunks_fts.document_id AS document_id,
                   chunks.content AS content,
                   chunks.metadata_json AS metadata_json,
                   bm25(chunks_fts) AS rank
            FROM chunks_fts
            JOIN chunks ON chunks.chunk_id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts_expression)
        .bind(limit as i64 * if filter.is_some() { 4 } else { 1 })
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&metadata_json)?;
            if !matches_filter(&metadata, filter) {
                continue;
            }
            // bm25() returns a non-positive score where more negative is
            // more relevant; flip the sign so higher raw_score means a
            // better match, matching the vector branch's convention.
            let rank: f64 = row.get("rank");
            hits.push(BranchHit {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                raw_score: -rank,
                metadata,
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            let result = sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected() as usize;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE chunk_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

fn matches_filter(metadata: &HashMap<String, serde_json::Value>, filter: Option<&VectorFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}
