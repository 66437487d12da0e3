//! Configuration parsing and validation.
//!
//! `ragd` is configured via a TOML file (default: `./config/ragd.toml`). The
//! config defines the database path, corpus roots to index, chunking
//! parameters, embedding provider settings, retrieval tuning, context
//! assembly limits, and deletion/audit behavior.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use ragd_core::chunk::ChunkStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Path to the SQLite metadata/keyword database.
    pub path: PathBuf,
    /// Directory holding ancillary state: audit log, session metadata.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Local document corpus roots, walked the way the teacher's filesystem
/// connector walks a source directory.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CorpusConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.html".to_string(),
        "**/*.htm".to_string(),
        "**/*.pdf".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_strategy() -> String {
    "sentence".to_string()
}
fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}
fn default_min_chunk_size() -> usize {
    100
}

impl ChunkingConfig {
    pub fn strategy(&self) -> Result<ChunkStrategy> {
        ChunkStrategy::parse(&self.strategy).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown chunking strategy: '{}'. Must be sentence, fixed, or recursive.",
                self.strategy
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_weight")]
    pub weight_semantic: f64,
    #[serde(default = "default_weight")]
    pub weight_keyword: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
    #[serde(default = "default_max_tokens")]
    pub context_window: usize,
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            weight_semantic: default_weight(),
            weight_keyword: default_weight(),
            rrf_k: default_rrf_k(),
            overfetch: default_overfetch(),
            final_limit: default_final_limit(),
            min_relevance: default_min_relevance(),
            context_window: default_max_tokens(),
            reserved_tokens: default_reserved_tokens(),
            max_results: None,
        }
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_overfetch() -> usize {
    4
}
fn default_final_limit() -> usize {
    10
}
fn default_min_relevance() -> f64 {
    0.3
}
fn default_max_tokens() -> usize {
    4000
}
fn default_reserved_tokens() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider. Unused by other providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn ollama_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeletionConfig {
    #[serde(default = "default_true")]
    pub enable_audit: bool,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { enable_audit: true }
    }
}

fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    config.chunking.strategy()?;

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    let weight_sum = config.retrieval.weight_semantic + config.retrieval.weight_keyword;
    if !(0.0..=1.0).contains(&config.retrieval.weight_semantic)
        || !(0.0..=1.0).contains(&config.retrieval.weight_keyword)
        || (weight_sum - 1.0).abs() > 1e-6
    {
        anyhow::bail!("retrieval.weight_semantic + retrieval.weight_keyword must sum to 1.0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_config(
            r#"
            [db]
            path = "./ragd.sqlite"

            [chunking]
            strategy = "sentence"
            chunk_size = 512
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.retrieval.final_limit, 10);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn rejects_unbalanced_retrieval_weights() {
        let file = write_config(
            r#"
            [db]
            path = "./ragd.sqlite"

            [chunking]
            strategy = "sentence"
            chunk_size = 512

            [retrieval]
            weight_semantic = 0.9
            weight_keyword = 0.9
            "#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let file = write_config(
            r#"
            [db]
            path = "./ragd.sqlite"

            [chunking]
            strategy = "sentence"
            chunk_size = 512

            [embedding]
            provider = "bogus"
            "#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn ollama_url_defaults_when_unset() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.ollama_url(), "http://localhost:11434");
    }
}
