//! SQLite-backed [`VectorStore`].
//!
//! `chunk_vectors` has no native ANN index — search is a brute-force cosine
//! scan over every row's embedding BLOB, the same approach the teacher's
//! `vector_search` query used before `ragd-core` existed. Fine at personal-
//! corpus scale; the interface is what a future sqlite-vec or on-disk HNSW
//! swap would target, not this scan.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use ragd_core::embedding::{blob_to_vec, cosine_similarity, distance_to_score, vec_to_blob};
use ragd_core::models::{BranchHit, VectorRecord};
use ragd_core::store::{VectorFilter, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    dimension: usize,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, dimension: usize) -> Self {
        Self { pool, dimension }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn supports_metadata_filtering(&self) -> bool {
        false
    }

    async fn add(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            anyhow::ensure!(
                r.embedding.len() == self.dimension,
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                r.embedding.len()
            );
            let blob = vec_to_blob(&r.embedding);
            let metadata_json = serde_json::to_string(&r.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, content, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&r.chunk_id)
            .bind(&r.document_id)
            .bind(&r.content)
            .bind(&blob)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>> {
        let rows = sqlx::query("SELECT chunk_id, document_id, content, embedding, metadata_json FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<BranchHit> = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&metadata_json)?;
            if !matches_filter(&metadata, filter) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            let similarity = cosine_similarity(query_embedding, &embedding);
            let score = distance_to_score(1.0 - similarity) as f64;
            hits.push(BranchHit {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                raw_score: score,
                metadata,
            });
        }

        hits.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Option<VectorRecord>>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT chunk_id, document_id, content, embedding, metadata_json FROM chunk_vectors WHERE chunk_id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            out.push(match row {
                Some(row) => {
                    let metadata_json: String = row.get("metadata_json");
                    let blob: Vec<u8> = row.get("embedding");
                    Some(VectorRecord {
                        chunk_id: row.get("chunk_id"),
                        document_id: row.get("document_id"),
                        embedding: blob_to_vec(&blob),
                        content: row.get("content"),
                        metadata: serde_json::from_str(&metadata_json)?,
                    })
                }
                None => None,
            });
        }
        Ok(out)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected() as usize;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE chunk_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn matches_filter(metadata: &HashMap<String, serde_json::Value>, filter: Option<&VectorFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}
