//! Storage trait contracts: [`MetadataStore`], [`VectorStore`], [`KeywordStore`].
//!
//! These are adapter contracts, not implementations — concrete SQLite-backed
//! adapters live in the `ragd` application crate. [`memory`] provides
//! in-memory reference implementations used by the core's own test suite and
//! by any caller that wants a dependency-free store for testing.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{BranchHit, DocumentMetadata, KeywordRecord, VectorRecord};

/// Conjunctive filter for [`MetadataStore::query`]. All populated fields are
/// ANDed together; `tags` semantics require every listed tag to be present.
#[derive(Debug, Clone, Default)]
pub struct MetadataQuery {
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub path_contains: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Durable key-value store keyed by `document_id`; see spec §4.4.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Upsert. Implementations set `created_at` once and bump `updated_at`
    /// on every write.
    async fn set(&self, meta: &DocumentMetadata) -> Result<()>;

    /// Returns the record, migrating it in place first if its
    /// `schema_version` is behind current.
    async fn get(&self, id: &str) -> Result<Option<DocumentMetadata>>;

    /// Partial update. Unknown fields are ignored. Returns `false` if `id`
    /// is absent.
    async fn update(&self, id: &str, fields: Value) -> Result<bool>;

    /// Removes the row; returns whether a row was actually removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Conjunctive filter, ordered by `ingestion_date` descending.
    async fn query(&self, filter: &MetadataQuery) -> Result<Vec<DocumentMetadata>>;

    /// Sweeps up to `batch_size` rows below the current schema version,
    /// migrating them in place. Returns the number migrated.
    async fn migrate_all(&self, batch_size: usize) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    async fn exists(&self, id: &str) -> Result<bool>;
}

/// Opaque metadata filter applied at the vector-store layer. `None` means
/// unfiltered.
pub type VectorFilter = HashMap<String, Value>;

/// Adapter contract for a dense vector store; see spec §4.5.
///
/// Scores returned by [`search`](VectorStore::search) MUST already be
/// normalized to `[0, 1]` — when the backend reports cosine *distance* in
/// `[0, 2]`, the adapter converts via `score = clamp(1 - distance / 2, 0, 1)`
/// before it ever reaches core code.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed embedding dimensionality this store was opened with.
    fn dimension(&self) -> usize;

    /// Whether `search`'s `filter` argument is honored natively. When
    /// `false`, callers are expected to overfetch and filter post hoc
    /// against the metadata store.
    fn supports_metadata_filtering(&self) -> bool;

    /// Insert or update records. Duplicate `chunk_id`s are upserts.
    async fn add(&self, records: &[VectorRecord]) -> Result<()>;

    /// Cosine-similarity search, returning up to `limit` hits ordered by
    /// descending score.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>>;

    /// Fetch records by id, preserving request order; missing ids yield
    /// `None` at that position.
    async fn get(&self, ids: &[String]) -> Result<Vec<Option<VectorRecord>>>;

    /// Delete records by id; returns the number actually removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    async fn exists(&self, id: &str) -> Result<bool>;

    /// Flush durable structures (no-op for purely in-memory backends).
    async fn persist(&self) -> Result<()>;

    /// Drop all records.
    async fn reset(&self) -> Result<()>;

    /// Release any held resources.
    async fn close(&self) -> Result<()>;
}

/// Adapter contract for the full-text keyword store; see spec §4.6.
///
/// `search` takes a backend-native FTS expression (the output of
/// [`crate::query::Fts5Transformer`]) and returns BM25-family raw scores —
/// normalization to `[0, 1]` is the hybrid searcher's job, not the store's.
#[async_trait]
pub trait KeywordStore: Send + Sync {
    /// Insert or update records. Duplicate `chunk_id`s are upserts.
    async fn add(&self, records: &[KeywordRecord]) -> Result<()>;

    /// Full-text search against a backend-native FTS expression.
    async fn search(
        &self,
        fts_expression: &str,
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<BranchHit>>;

    /// Delete records by id; returns the number actually removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    async fn exists(&self, id: &str) -> Result<bool>;
}
