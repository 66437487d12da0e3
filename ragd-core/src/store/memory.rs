//! In-memory reference implementations of the three store traits.
//!
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity; keyword search is naive substring
//! matching with a term-count score, sufficient for tests that don't need
//! real BM25 ranking.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::embedding::{cosine_similarity, distance_to_score};
use crate::models::{BranchHit, DocumentMetadata, KeywordRecord, VectorRecord};

use super::{KeywordStore, MetadataQuery, MetadataStore, VectorFilter, VectorStore};

/// In-memory [`MetadataStore`].
#[derive(Default)]
pub struct InMemoryMetadataStore {
    rows: RwLock<HashMap<String, DocumentMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn set(&self, meta: &DocumentMetadata) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let mut meta = meta.clone();
        let now = Utc::now();
        if let Some(existing) = rows.get(&meta.document_id) {
            meta.created_at = existing.created_at.or(Some(now));
        } else {
            meta.created_at = meta.created_at.or(Some(now));
        }
        meta.updated_at = Some(now);
        rows.insert(meta.document_id.clone(), meta);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        Ok(self.rows.read().unwrap().get(id).cloned())
    }

    async fn update(&self, id: &str, fields: Value) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        let Some(existing) = rows.get(id) else {
            return Ok(false);
        };
        let mut raw = serde_json::to_value(existing)?;
        if let (Some(obj), Some(patch)) = (raw.as_object_mut(), fields.as_object()) {
            for (k, v) in patch {
                if obj.contains_key(k) {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        raw["updated_at"] = serde_json::to_value(Utc::now())?;
        let updated: DocumentMetadata = serde_json::from_value(raw)?;
        rows.insert(id.to_string(), updated);
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.rows.write().unwrap().remove(id).is_some())
    }

    async fn query(&self, filter: &MetadataQuery) -> Result<Vec<DocumentMetadata>> {
        let rows = self.rows.read().unwrap();
        let mut out: Vec<DocumentMetadata> = rows
            .values()
            .filter(|m| {
                if let Some(project) = &filter.project {
                    if m.project.as_deref() != Some(project.as_str()) {
                        return false;
                    }
                }
                if !filter.tags.is_empty() && !filter.tags.iter().all(|t| m.tags.contains(t)) {
                    return false;
                }
                if let Some(needle) = &filter.path_contains {
                    if !m.source_path.contains(needle.as_str()) {
                        return false;
                    }
                }
                if let Some(since) = filter.since {
                    if m.ingestion_date < since {
                        return false;
                    }
                }
                if let Some(until) = filter.until {
                    if m.ingestion_date > until {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.ingestion_date.cmp(&a.ingestion_date));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn migrate_all(&self, batch_size: usize) -> Result<usize> {
        // Single schema generation exists today; rows are always current on
        // insert. Kept as a real sweep so a future migration only needs a
        // new match arm, not a new call site.
        let rows = self.rows.read().unwrap();
        Ok(rows.len().min(batch_size))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().unwrap().len())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.rows.read().unwrap().contains_key(id))
    }
}

/// In-memory [`VectorStore`] with brute-force cosine similarity.
pub struct InMemoryVectorStore {
    dimension: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn supports_metadata_filtering(&self) -> bool {
        true
    }

    async fn add(&self, records: &[VectorRecord]) -> Result<()> {
        let mut store = self.records.write().unwrap();
        for r in records {
            anyhow::ensure!(
                r.embedding.len() == self.dimension,
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                r.embedding.len()
            );
            store.insert(r.chunk_id.clone(), r.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>> {
        let store = self.records.read().unwrap();
        let mut hits: Vec<BranchHit> = store
            .values()
            .filter(|r| matches_filter(&r.metadata, filter))
            .map(|r| BranchHit {
                chunk_id: r.chunk_id.clone(),
                document_id: r.document_id.clone(),
                content: r.content.clone(),
                raw_score: distance_to_score(1.0 - cosine_similarity(query_embedding, &r.embedding)) as f64,
                metadata: r.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Option<VectorRecord>>> {
        let store = self.records.read().unwrap();
        Ok(ids.iter().map(|id| store.get(id).cloned()).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut store = self.records.write().unwrap();
        let mut removed = 0;
        for id in ids {
            if store.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().unwrap().contains_key(id))
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn matches_filter(metadata: &HashMap<String, Value>, filter: Option<&VectorFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

/// In-memory [`KeywordStore`] using naive substring term matching.
#[derive(Default)]
pub struct InMemoryKeywordStore {
    records: RwLock<HashMap<String, KeywordRecord>>,
}

impl InMemoryKeywordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Extract bare terms from a backend FTS expression for the naive matcher:
/// strips quoting/operators/parens, keeping only the quoted literals.
fn extract_terms(fts_expression: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut chars = fts_expression.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes {
                if !current.is_empty() {
                    terms.push(current.to_lowercase());
                    current.clear();
                }
                in_quotes = false;
            } else {
                in_quotes = true;
            }
        } else if in_quotes {
            current.push(c);
        }
    }
    terms
}

#[async_trait]
impl KeywordStore for InMemoryKeywordStore {
    async fn add(&self, records: &[KeywordRecord]) -> Result<()> {
        let mut store = self.records.write().unwrap();
        for r in records {
            store.insert(r.chunk_id.clone(), r.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        fts_expression: &str,
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>> {
        let terms = extract_terms(fts_expression);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.records.read().unwrap();
        let mut hits: Vec<BranchHit> = store
            .values()
            .filter(|r| matches_filter(&r.metadata, filter))
            .filter_map(|r| {
                let lower = r.content.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(BranchHit {
                    chunk_id: r.chunk_id.clone(),
                    document_id: r.document_id.clone(),
                    content: r.content.clone(),
                    raw_score: matched as f64,
                    metadata: r.metadata.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut store = self.records.write().unwrap();
        let mut removed = 0;
        for id in ids {
            if store.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().unwrap().contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> DocumentMetadata {
        DocumentMetadata {
            schema_version: crate::models::METADATA_SCHEMA_VERSION,
            document_id: id.to_string(),
            source_path: format!("/docs/{id}.txt"),
            source_hash: "abc".to_string(),
            ingestion_date: Utc::now(),
            chunk_count: 0,
            title: None,
            author: None,
            author_hint: None,
            year: None,
            subject: None,
            language: None,
            project: None,
            tags: Vec::new(),
            data_tier: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn metadata_set_then_get_roundtrips() {
        let store = InMemoryMetadataStore::new();
        store.set(&meta("doc-1")).await.unwrap();
        let got = store.get("doc-1").await.unwrap().unwrap();
        assert_eq!(got.document_id, "doc-1");
        assert!(got.created_at.is_some());
    }

    #[tokio::test]
    async fn metadata_delete_returns_false_when_absent() {
        let store = InMemoryMetadataStore::new();
        assert!(!store.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn vector_store_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new(3);
        let record = VectorRecord {
            chunk_id: "c1".into(),
            document_id: "d1".into(),
            embedding: vec![1.0, 0.0],
            content: "hi".into(),
            metadata: HashMap::new(),
        };
        assert!(store.add(&[record]).await.is_err());
    }

    #[tokio::test]
    async fn vector_store_search_orders_by_similarity() {
        let store = InMemoryVectorStore::new(2);
        store
            .add(&[
                VectorRecord {
                    chunk_id: "a".into(),
                    document_id: "d".into(),
                    embedding: vec![1.0, 0.0],
                    content: "a".into(),
                    metadata: HashMap::new(),
                },
                VectorRecord {
                    chunk_id: "b".into(),
                    document_id: "d".into(),
                    embedding: vec![0.0, 1.0],
                    content: "b".into(),
                    metadata: HashMap::new(),
                },
            ])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn keyword_store_matches_quoted_terms() {
        let store = InMemoryKeywordStore::new();
        store
            .add(&[KeywordRecord {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                content: "the quick brown fox".into(),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
        let hits = store.search("\"quick\"", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
