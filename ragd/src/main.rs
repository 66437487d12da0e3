//! `ragd` — a local retrieval-augmented generation engine over a personal
//! document corpus.
//!
//! ```text
//! Filesystem corpus → extract → chunk → embed → SQLite (FTS5 + vectors) → hybrid search → ask
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ragd_core::models::SearchMode;

use ragd::ask::ask;
use ragd::config::{self, Config};
use ragd::deletion::{DeletionAuditLog, DeletionEngine, DeletionLevel};
use ragd::embedding::create_provider;
use ragd::health::health_check;
use ragd::ingest::Pipeline;
use ragd::progress::ProgressMode;
use ragd::search::{print_results, run_search};
use ragd::sqlite_keyword::SqliteKeywordStore;
use ragd::sqlite_metadata::SqliteMetadataStore;
use ragd::sqlite_vector::SqliteVectorStore;
use ragd::stats::collect_stats;
use ragd::{db, migrate};
use ragd_core::context::ContextBuilderConfig;
use ragd_core::search::{HybridSearcher, SearchParams};

#[derive(Parser)]
#[command(name = "ragd", about = "A local retrieval-augmented generation engine", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./ragd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Index files or directories into the corpus
    Index {
        /// Paths to index
        paths: Vec<PathBuf>,

        /// Recurse into directories
        #[arg(long, default_value_t = true)]
        recursive: bool,

        /// Skip files whose content hash already exists
        #[arg(long, default_value_t = true)]
        skip_duplicates: bool,

        /// Emit machine-readable JSON progress instead of human text
        #[arg(long)]
        json_progress: bool,

        /// Disable progress output entirely
        #[arg(long)]
        no_progress: bool,
    },

    /// Search indexed documents
    Search {
        /// Search query
        query: String,

        /// Search mode: keyword, semantic, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve context and citations for a question, without generation
    Ask {
        /// Natural-language question
        question: String,
    },

    /// Delete a document from the corpus
    Delete {
        /// Document ID
        document_id: String,

        /// Deletion level: standard, secure, or cryptographic
        #[arg(long, default_value = "standard")]
        level: String,

        /// Confirm a destructive deletion (required for cryptographic)
        #[arg(long)]
        confirm: bool,

        /// Password for cryptographic key rotation
        #[arg(long)]
        password: Option<String>,
    },

    /// Show corpus statistics
    Stats,

    /// Check the health of every component
    HealthCheck,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index { paths, recursive, skip_duplicates, json_progress, no_progress } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;

            let metadata = SqliteMetadataStore::new(pool.clone());
            let vectors = SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0));
            let keyword = SqliteKeywordStore::new(pool.clone());
            let embedder = create_provider(&cfg.embedding)?;

            let mode = if no_progress {
                ProgressMode::Off
            } else if json_progress {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            let reporter = mode.reporter();

            let pipeline = Pipeline {
                config: &cfg,
                metadata: &metadata,
                vectors: &vectors,
                keyword: &keyword,
                embedder: embedder.as_ref(),
            };

            let results = pipeline.index(&paths, recursive, skip_duplicates, Some(reporter.as_ref())).await?;

            let mut indexed = 0;
            let mut skipped = 0;
            let mut failed = 0;
            for r in &results {
                if r.skipped {
                    skipped += 1;
                } else if r.success {
                    indexed += 1;
                } else {
                    failed += 1;
                    eprintln!("error: {}: {}", r.path, r.error.as_deref().unwrap_or("unknown error"));
                }
            }
            println!("indexed {indexed}, skipped {skipped}, failed {failed}");

            pool.close().await;
        }
        Commands::Search { query, mode, limit } => {
            let pool = db::connect(&cfg).await?;
            let vectors = Arc::new(SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0)));
            let keyword = Arc::new(SqliteKeywordStore::new(pool.clone()));
            let embedder: Arc<dyn ragd_core::embedding::EmbeddingProvider> = create_provider(&cfg.embedding)?.into();
            let searcher = HybridSearcher::new(vectors, keyword, embedder);

            let mode = parse_mode(&mode)?;
            let results = run_search(&searcher, &cfg, &query, mode, limit).await?;
            print_results(&results);

            pool.close().await;
        }
        Commands::Ask { question } => {
            let pool = db::connect(&cfg).await?;
            let vectors = Arc::new(SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0)));
            let keyword = Arc::new(SqliteKeywordStore::new(pool.clone()));
            let embedder: Arc<dyn ragd_core::embedding::EmbeddingProvider> = create_provider(&cfg.embedding)?.into();
            let searcher = HybridSearcher::new(vectors, keyword, embedder);

            let params = SearchParams {
                mode: SearchMode::Hybrid,
                weight_semantic: cfg.retrieval.weight_semantic,
                weight_keyword: cfg.retrieval.weight_keyword,
                limit: cfg.retrieval.final_limit,
                filter: None,
            };
            let context_config = ContextBuilderConfig {
                min_relevance: cfg.retrieval.min_relevance,
                max_tokens: cfg.retrieval.context_window,
                reserved_tokens: cfg.retrieval.reserved_tokens,
                max_results: cfg.retrieval.max_results,
            };

            let answer = ask(&searcher, &question, &params, &context_config).await?;
            println!("{}", answer.context);
            println!();
            for c in &answer.citations {
                match &c.location {
                    Some(loc) => println!("[{}] {} ({loc})", c.index, c.document_name),
                    None => println!("[{}] {}", c.index, c.document_name),
                }
            }

            pool.close().await;
        }
        Commands::Delete { document_id, level, confirm, password } => {
            let level = DeletionLevel::parse(&level)
                .ok_or_else(|| anyhow::anyhow!("unknown deletion level: {level}"))?;

            let pool = db::connect(&cfg).await?;
            let metadata = SqliteMetadataStore::new(pool.clone());
            let vectors = SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0));
            let keyword = SqliteKeywordStore::new(pool.clone());

            let audit_log = if cfg.deletion.enable_audit {
                Some(DeletionAuditLog::new(cfg.db.data_dir.join("audit").join("deletions.log")))
            } else {
                None
            };

            let engine = DeletionEngine { metadata: &metadata, vectors: &vectors, keyword: &keyword, audit_log };
            let report = |msg: &str| println!("{msg}");
            let result = engine
                .delete(&document_id, level, confirm, password.as_deref(), Some(&report))
                .await?;

            println!(
                "deleted {} chunks, {} vectors (audit_logged={})",
                result.chunks_deleted, result.vectors_deleted, result.audit_logged
            );

            pool.close().await;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            let metadata = SqliteMetadataStore::new(pool.clone());
            let vectors = SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0));
            let keyword = SqliteKeywordStore::new(pool.clone());

            let stats = collect_stats(&metadata, &vectors, &keyword, "sqlite").await?;
            println!("documents: {}", stats.document_count);
            println!("chunks:    {}", stats.chunk_count);
            println!("backend:   {}", stats.backend);
            println!("dimension: {}", stats.dimension);

            pool.close().await;
        }
        Commands::HealthCheck => {
            let pool = db::connect(&cfg).await?;
            let metadata = SqliteMetadataStore::new(pool.clone());
            let vectors = SqliteVectorStore::new(pool.clone(), cfg.embedding.dims.unwrap_or(0));
            let keyword = SqliteKeywordStore::new(pool.clone());
            let embedder = create_provider(&cfg.embedding)?;

            let checks = health_check(&metadata, &vectors, &keyword, embedder.as_ref()).await;
            for check in &checks {
                println!("{:<20} {:?}  ({} ms)  {}", check.component, check.status, check.latency_ms, check.message);
            }

            pool.close().await;
        }
    }

    Ok(())
}

fn parse_mode(s: &str) -> anyhow::Result<SearchMode> {
    match s {
        "keyword" => Ok(SearchMode::Keyword),
        "semantic" => Ok(SearchMode::Semantic),
        "hybrid" => Ok(SearchMode::Hybrid),
        other => anyhow::bail!("unknown search mode: {other} (expected keyword, semantic, or hybrid)"),
    }
}
