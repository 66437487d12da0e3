//! SQLite-backed [`MetadataStore`].
//!
//! Maps each method onto the `documents` table created in [`crate::migrate`].
//! `metadata_json` holds the full serialized [`DocumentMetadata`]; the
//! `source_path`/`content_hash`/`ingestion_date` columns are denormalized
//! copies that let dedup lookups and ordering avoid `json_extract` on the
//! hot path.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use ragd_core::models::DocumentMetadata;
use ragd_core::store::{MetadataQuery, MetadataStore};

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn set(&self, meta: &DocumentMetadata) -> Result<()> {
        let mut meta = meta.clone();
        let now = Utc::now();

        let existing_created_at: Option<String> =
            sqlx::query_scalar("SELECT created_at FROM documents WHERE id = ?")
                .bind(&meta.document_id)
                .fetch_optional(&self.pool)
                .await?;

        let created_at = match existing_created_at {
            Some(ts) => ts,
            None => meta.created_at.unwrap_or(now).to_rfc3339(),
        };
        let updated_at = now.to_rfc3339();
        meta.created_at = Some(chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc));
        meta.updated_at = Some(now);

        let metadata_json = serde_json::to_string(&meta)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_path, content_hash, ingestion_date, created_at, updated_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_path = excluded.source_path,
                content_hash = excluded.content_hash,
                ingestion_date = excluded.ingestion_date,
                updated_at = excluded.updated_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&meta.document_id)
        .bind(&meta.source_path)
        .bind(&meta.source_hash)
        .bind(meta.ingestion_date.to_rfc3339())
        .bind(&created_at)
        .bind(&updated_at)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT metadata_json FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((metadata_json,)) = row else {
            return Ok(None);
        };
        let raw: serde_json::Value = serde_json::from_str(&metadata_json)?;
        if DocumentMetadata::needs_migration(&raw) {
            let migrated = DocumentMetadata::migrate(raw)?;
            self.set(&migrated).await?;
            return Ok(Some(migrated));
        }
        Ok(Some(serde_json::from_value(raw)?))
    }

    async fn update(&self, id: &str, fields: serde_json::Value) -> Result<bool> {
        let Some(existing) = self.get(id).await? else {
            return Ok(false);
        };
        let mut raw = serde_json::to_value(&existing)?;
        if let (Some(obj), Some(patch)) = (raw.as_object_mut(), fields.as_object()) {
            for (k, v) in patch {
                if obj.contains_key(k) {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        let updated: DocumentMetadata = serde_json::from_value(raw)?;
        self.set(&updated).await?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: &MetadataQuery) -> Result<Vec<DocumentMetadata>> {
        // Coarse SQL filter on indexed columns, then finish tag/path
        // filtering in memory — `tags` is a JSON array and SQLite's
        // json_extract returns it as a string, not something worth
        // pattern-matching against.
        let mut sql = String::from("SELECT metadata_json FROM documents WHERE 1=1");
        if filter.project.is_some() {
            sql.push_str(" AND json_extract(metadata_json, '$.project') = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND ingestion_date >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND ingestion_date <= ?");
        }
        sql.push_str(" ORDER BY ingestion_date DESC");

        let mut query = sqlx::query(&sql);
        if let Some(project) = &filter.project {
            query = query.bind(project);
        }
        if let Some(since) = filter.since {
            query = query.bind(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            query = query.bind(until.to_rfc3339());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let meta: DocumentMetadata = serde_json::from_str(&metadata_json)?;
            if !filter.tags.is_empty() && !filter.tags.iter().all(|t| meta.tags.contains(t)) {
                continue;
            }
            if let Some(needle) = &filter.path_contains {
                if !meta.source_path.contains(needle.as_str()) {
                    continue;
                }
            }
            out.push(meta);
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn migrate_all(&self, batch_size: usize) -> Result<usize> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, metadata_json FROM documents LIMIT ?")
                .bind(batch_size as i64)
                .fetch_all(&self.pool)
                .await?;

        let mut migrated = 0;
        for (_, metadata_json) in rows {
            let raw: serde_json::Value = serde_json::from_str(&metadata_json)?;
            if DocumentMetadata::needs_migration(&raw) {
                let meta = DocumentMetadata::migrate(raw)?;
                self.set(&meta).await?;
                migrated += 1;
            }
        }
        Ok(migrated)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragd_core::models::METADATA_SCHEMA_VERSION;

    async fn setup() -> SqliteMetadataStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        SqliteMetadataStore::new(pool)
    }

    fn meta(id: &str) -> DocumentMetadata {
        DocumentMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            document_id: id.to_string(),
            source_path: format!("/docs/{id}.txt"),
            source_hash: "abc123".to_string(),
            ingestion_date: Utc::now(),
            chunk_count: 3,
            title: Some("Title".to_string()),
            author: None,
            author_hint: None,
            year: None,
            subject: None,
            language: None,
            project: Some("proj-a".to_string()),
            tags: vec!["rust".to_string()],
            data_tier: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = setup().await;
        store.set(&meta("doc-1")).await.unwrap();
        let got = store.get("doc-1").await.unwrap().unwrap();
        assert_eq!(got.document_id, "doc-1");
        assert!(got.created_at.is_some());
    }

    #[tokio::test]
    async fn set_preserves_created_at_across_updates() {
        let store = setup().await;
        store.set(&meta("doc-1")).await.unwrap();
        let first = store.get("doc-1").await.unwrap().unwrap();

        let mut second = meta("doc-1");
        second.chunk_count = 7;
        store.set(&second).await.unwrap();
        let updated = store.get("doc-1").await.unwrap().unwrap();

        assert_eq!(first.created_at, updated.created_at);
        assert_eq!(updated.chunk_count, 7);
        assert!(updated.updated_at.unwrap() >= first.updated_at.unwrap());
    }

    #[tokio::test]
    async fn delete_returns_false_when_absent() {
        let store = setup().await;
        assert!(!store.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_by_project_and_tags() {
        let store = setup().await;
        store.set(&meta("doc-1")).await.unwrap();
        let mut other = meta("doc-2");
        other.project = Some("proj-b".to_string());
        store.set(&other).await.unwrap();

        let results = store
            .query(&MetadataQuery {
                project: Some("proj-a".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-1");
    }

    #[tokio::test]
    async fn update_patches_known_fields_only() {
        let store = setup().await;
        store.set(&meta("doc-1")).await.unwrap();
        let ok = store
            .update("doc-1", serde_json::json!({ "chunk_count": 99, "unknown_field": "x" }))
            .await
            .unwrap();
        assert!(ok);
        let updated = store.get("doc-1").await.unwrap().unwrap();
        assert_eq!(updated.chunk_count, 99);
    }

    #[tokio::test]
    async fn count_and_exists() {
        let store = setup().await;
        assert_eq!(store.count().await.unwrap(), 0);
        store.set(&meta("doc-1")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.exists("doc-1").await.unwrap());
        assert!(!store.exists("doc-2").await.unwrap());
    }
}
