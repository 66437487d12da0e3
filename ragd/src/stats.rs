//! Corpus statistics.
//!
//! Answers `stats()`: a quick summary of what's indexed, used to sanity
//! check that ingestion and embedding are keeping up with the corpus.

use serde::Serialize;

use ragd_core::store::{KeywordStore, MetadataStore, VectorStore};

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub backend: String,
    pub dimension: usize,
}

pub async fn collect_stats(
    metadata: &dyn MetadataStore,
    vectors: &dyn VectorStore,
    keyword: &dyn KeywordStore,
    backend: &str,
) -> anyhow::Result<Stats> {
    let document_count = metadata.count().await?;
    // Chunk count is authoritative from the keyword store: every chunk is
    // always indexed for keyword search, while vectors are optional when
    // embedding is disabled.
    let chunk_count = keyword.count().await?;

    Ok(Stats {
        document_count,
        chunk_count,
        backend: backend.to_string(),
        dimension: vectors.dimension(),
    })
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragd_core::store::memory::{InMemoryKeywordStore, InMemoryMetadataStore, InMemoryVectorStore};

    #[tokio::test]
    async fn empty_stores_report_zero() {
        let metadata = InMemoryMetadataStore::new();
        let vectors = InMemoryVectorStore::new(384);
        let keyword = InMemoryKeywordStore::new();

        let stats = collect_stats(&metadata, &vectors, &keyword, "sqlite").await.unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.dimension, 384);
        assert_eq!(stats.backend, "sqlite");
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
