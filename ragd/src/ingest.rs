//! Ingestion pipeline: discover corpus files, extract, chunk, embed, persist.
//!
//! `index()` walks the configured corpus roots the way the teacher's
//! filesystem connector walked a source directory, then runs the ordered
//! persistence algorithm per document: metadata row, then vectors, then
//! keyword records, rolling the first two back if the keyword write fails.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use ragd_core::chunk::{chunk_text, ChunkParams};
use ragd_core::embedding::EmbeddingProvider;
use ragd_core::models::{DocumentMetadata, KeywordRecord, VectorRecord, METADATA_SCHEMA_VERSION};
use ragd_core::store::{KeywordStore, MetadataStore, VectorStore};

use crate::config::Config;
use crate::extract::{self, ExtractError};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};

/// Outcome of attempting to index one file.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub path: String,
    pub success: bool,
    pub skipped: bool,
    pub chunk_count: usize,
    pub document_id: Option<String>,
    pub error: Option<String>,
}

impl IndexResult {
    fn skipped(path: &Path) -> Self {
        Self {
            path: path.display().to_string(),
            success: true,
            skipped: true,
            chunk_count: 0,
            document_id: None,
            error: None,
        }
    }

    fn failure(path: &Path, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.display().to_string(),
            success: false,
            skipped: false,
            chunk_count: 0,
            document_id: None,
            error: Some(error.to_string()),
        }
    }

    fn success(path: &Path, document_id: String, chunk_count: usize) -> Self {
        Self {
            path: path.display().to_string(),
            success: true,
            skipped: false,
            chunk_count,
            document_id: Some(document_id),
            error: None,
        }
    }
}

pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub metadata: &'a dyn MetadataStore,
    pub vectors: &'a dyn VectorStore,
    pub keyword: &'a dyn KeywordStore,
    pub embedder: &'a dyn EmbeddingProvider,
}

impl<'a> Pipeline<'a> {
    /// Walk `paths` (files or directories) and index every matching document.
    pub async fn index(
        &self,
        paths: &[PathBuf],
        recursive: bool,
        skip_duplicates: bool,
        progress: Option<&dyn IndexProgressReporter>,
    ) -> Result<Vec<IndexResult>> {
        let no_progress = NoProgress;
        let progress = progress.unwrap_or(&no_progress);

        progress.report(IndexProgressEvent::Discovering);
        let files = discover_files(paths, recursive, &self.config.corpus)?;

        let mut results = Vec::with_capacity(files.len());
        let total = files.len() as u64;
        for (i, path) in files.iter().enumerate() {
            progress.report(IndexProgressEvent::Processing {
                path: path.display().to_string(),
                n: (i + 1) as u64,
                total,
            });
            results.push(self.index_one(path, skip_duplicates).await);
        }
        Ok(results)
    }

    async fn index_one(&self, path: &Path, skip_duplicates: bool) -> IndexResult {
        match self.try_index_one(path, skip_duplicates).await {
            Ok(result) => result,
            Err(e) => IndexResult::failure(path, e),
        }
    }

    async fn try_index_one(&self, path: &Path, skip_duplicates: bool) -> Result<IndexResult> {
        let bytes = std::fs::read(path)?;
        let content_hash = hex_sha256(&bytes);

        if skip_duplicates {
            let existing = self
                .metadata
                .query(&ragd_core::store::MetadataQuery::default())
                .await?;
            if existing.iter().any(|m| m.source_hash == content_hash) {
                return Ok(IndexResult::skipped(path));
            }
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content_type = extract::content_type_for_extension(ext)
            .ok_or_else(|| anyhow::anyhow!("unsupported file extension: .{}", ext))?;

        let extraction = extract::extract_text(&bytes, content_type)
            .map_err(|e: ExtractError| anyhow::anyhow!(e))?;

        let source_path = path.display().to_string();
        let document_id = document_id_for(&source_path, &content_hash);

        let strategy = self.config.chunking.strategy()?;
        let params = ChunkParams {
            chunk_size: self.config.chunking.chunk_size,
            overlap: self.config.chunking.overlap,
            min_chunk_size: self.config.chunking.min_chunk_size,
        };
        let chunks = chunk_text(&document_id, &extraction.text, strategy, params);

        if chunks.is_empty() {
            return Ok(IndexResult::success(path, document_id, 0));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = if self.embedder.dims() > 0 {
            self.embedder.embed(&texts).await?
        } else {
            Vec::new()
        };

        let meta = DocumentMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            document_id: document_id.clone(),
            source_path: source_path.clone(),
            source_hash: content_hash,
            ingestion_date: Utc::now(),
            chunk_count: chunks.len(),
            title: extraction.title.clone(),
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
        };

        // Ordered persistence: metadata, then vectors, then keyword. Roll
        // vectors and metadata back if the keyword write fails.
        self.metadata.set(&meta).await?;

        let vector_records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| VectorRecord {
                chunk_id: chunk.chunk_id.clone(),
                document_id: document_id.clone(),
                embedding: embedding.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        if !vector_records.is_empty() {
            if let Err(e) = self.vectors.add(&vector_records).await {
                self.metadata.delete(&document_id).await.ok();
                return Err(e);
            }
        }

        let keyword_records: Vec<KeywordRecord> = chunks
            .iter()
            .map(|chunk| KeywordRecord {
                chunk_id: chunk.chunk_id.clone(),
                document_id: document_id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        if let Err(e) = self.keyword.add(&keyword_records).await {
            let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
            self.vectors.delete(&chunk_ids).await.ok();
            self.metadata.delete(&document_id).await.ok();
            return Err(e);
        }

        Ok(IndexResult::success(path, document_id, chunks.len()))
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn document_id_for(source_path: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Walk `paths`, expanding directories per `corpus` globs, returning a
/// deterministically sorted, deduplicated list of candidate files.
fn discover_files(
    paths: &[PathBuf],
    recursive: bool,
    corpus: &crate::config::CorpusConfig,
) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&corpus.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .max_depth(max_depth)
            .follow_links(corpus.follow_symlinks);

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy();

            if exclude_set.is_match(rel_str.as_ref()) {
                continue;
            }
            if !include_set.is_match(rel_str.as_ref()) {
                continue;
            }
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorpusConfig;
    use std::io::Write;

    fn corpus() -> CorpusConfig {
        CorpusConfig {
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    #[test]
    fn discover_files_matches_include_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello").unwrap();
        std::fs::write(dir.path().join("b.bin"), "hello").unwrap();

        let files = discover_files(&[dir.path().to_path_buf()], true, &corpus()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.md"));
    }

    #[test]
    fn discover_files_excludes_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config.md"), "x").unwrap();
        std::fs::write(dir.path().join("real.md"), "x").unwrap();

        let files = discover_files(&[dir.path().to_path_buf()], true, &corpus()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("real.md"));
    }

    #[test]
    fn discover_files_respects_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.md"), "x").unwrap();
        std::fs::write(dir.path().join("sub/nested.md"), "x").unwrap();

        let files = discover_files(&[dir.path().to_path_buf()], false, &corpus()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("top.md"));
    }

    #[test]
    fn document_id_is_deterministic() {
        let a = document_id_for("/docs/a.md", "hash1");
        let b = document_id_for("/docs/a.md", "hash1");
        let c = document_id_for("/docs/a.md", "hash2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn index_empty_document_succeeds_with_zero_chunks() {
        use ragd_core::store::memory::{InMemoryKeywordStore, InMemoryMetadataStore, InMemoryVectorStore};
        use crate::embedding::DisabledProvider;

        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("empty.txt")).unwrap();
        writeln!(file, "   ").unwrap();

        let config_str = format!(
            "[db]\npath = \"{}/db.sqlite\"\n\n[chunking]\nstrategy = \"sentence\"\nchunk_size = 512\n",
            dir.path().display()
        );
        let config_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(config_file.path(), config_str).unwrap();
        let config = crate::config::load_config(config_file.path()).unwrap();

        let metadata = InMemoryMetadataStore::new();
        let vectors = InMemoryVectorStore::new(0);
        let keyword = InMemoryKeywordStore::new();
        let embedder = DisabledProvider;

        let pipeline = Pipeline {
            config: &config,
            metadata: &metadata,
            vectors: &vectors,
            keyword: &keyword,
            embedder: &embedder,
        };

        let results = pipeline
            .index(&[dir.path().to_path_buf()], true, true, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].chunk_count, 0);
    }
}
