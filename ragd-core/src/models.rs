//! Core data types shared by every store, chunker, and search component.
//!
//! These types carry no I/O; they are the values that flow between the
//! extractor, the chunker, the three stores, and the searcher.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable logical unit derived from one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub source_path: String,
    pub content_hash: String,
    pub file_type: String,
    pub size_bytes: u64,
    pub indexed_at: DateTime<Utc>,
    pub metadata: Value,
}

/// A contiguous span of a document's normalized text, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
    pub token_count: usize,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Chunk {
    /// Canonical chunk id: `{document_id}#{chunk_index}`.
    pub fn make_id(document_id: &str, chunk_index: usize) -> String {
        format!("{document_id}#{chunk_index}")
    }
}

/// Current on-disk schema version for [`DocumentMetadata`]. Rows with an
/// older version are migrated on read; rows with a newer version are
/// rejected.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// The durable, descriptive record for one document, independent of its
/// chunks. Owned by the metadata store; the vector/keyword stores keep only
/// a denormalized subset for filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub document_id: String,
    pub source_path: String,
    pub source_hash: String,
    pub ingestion_date: DateTime<Utc>,
    pub chunk_count: usize,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_hint: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub data_tier: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u32 {
    METADATA_SCHEMA_VERSION
}

impl DocumentMetadata {
    /// Migrate a raw JSON blob read from storage to the current schema.
    /// Versions below [`METADATA_SCHEMA_VERSION`] are upgraded in place;
    /// there is currently one schema generation, so migration is the
    /// identity transform with the version field stamped forward. Future
    /// migrations append match arms here rather than rewriting callers.
    pub fn migrate(mut raw: Value) -> anyhow::Result<Self> {
        let version = raw
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        if version > METADATA_SCHEMA_VERSION {
            anyhow::bail!(
                "metadata schema_version {version} is newer than supported {METADATA_SCHEMA_VERSION}"
            );
        }
        if let Some(obj) = raw.as_object_mut() {
            obj.insert(
                "schema_version".to_string(),
                Value::from(METADATA_SCHEMA_VERSION),
            );
        }
        Ok(serde_json::from_value(raw)?)
    }

    pub fn needs_migration(raw: &Value) -> bool {
        raw.get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(0) < METADATA_SCHEMA_VERSION as u64
    }
}

/// `(chunk_id, embedding, content, metadata_subset)` — the authoritative
/// record for one chunk's vector representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// `(chunk_id, document_id, content, metadata_subset)` — the authoritative
/// record for one chunk's full-text representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// A chunk-level hit from a single retrieval branch, before fusion.
#[derive(Debug, Clone)]
pub struct BranchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub raw_score: f64,
    pub metadata: HashMap<String, Value>,
}

/// A fused hit returned by the hybrid searcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub content: String,
    pub combined_score: f64,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub rrf_score: f64,
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Search mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_document_id_hash_index() {
        assert_eq!(Chunk::make_id("doc-1", 3), "doc-1#3");
    }

    #[test]
    fn metadata_migrate_stamps_current_version() {
        let raw = serde_json::json!({
            "document_id": "doc-1",
            "source_path": "/a/b.txt",
            "source_hash": "abc",
            "ingestion_date": Utc::now(),
            "chunk_count": 2,
        });
        let meta = DocumentMetadata::migrate(raw).unwrap();
        assert_eq!(meta.schema_version, METADATA_SCHEMA_VERSION);
    }

    #[test]
    fn metadata_rejects_future_schema() {
        let raw = serde_json::json!({
            "schema_version": METADATA_SCHEMA_VERSION + 1,
            "document_id": "doc-1",
            "source_path": "/a/b.txt",
            "source_hash": "abc",
            "ingestion_date": Utc::now(),
            "chunk_count": 0,
        });
        assert!(DocumentMetadata::migrate(raw).is_err());
    }
}
