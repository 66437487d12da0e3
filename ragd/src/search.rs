//! Application-level entry point for `ragd search`.
//!
//! The core fusion algorithm lives in
//! [`ragd_core::search::HybridSearcher`]; this wrapper builds it from a
//! [`Config`], runs the query, and formats results for the terminal.

use anyhow::Result;

use ragd_core::models::{HybridSearchResult, SearchMode};
use ragd_core::search::{HybridSearcher, SearchParams};

use crate::config::Config;

pub async fn run_search(
    searcher: &HybridSearcher,
    config: &Config,
    query: &str,
    mode: SearchMode,
    limit: Option<usize>,
) -> Result<Vec<HybridSearchResult>> {
    let params = SearchParams {
        mode,
        weight_semantic: config.retrieval.weight_semantic,
        weight_keyword: config.retrieval.weight_keyword,
        limit: limit.unwrap_or(config.retrieval.final_limit),
        filter: None,
    };
    searcher.search(query, &params).await
}

pub fn print_results(results: &[HybridSearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            result.combined_score,
            result.document_name
        );
        println!(
            "    semantic={:.3}  keyword={:.3}  rrf={:.5}",
            result.semantic_score, result.keyword_score, result.rrf_score
        );
        if let Some(location) = &result.location {
            println!("    location: {location}");
        }
        println!("    excerpt: \"{}\"", result.content.replace('\n', " ").trim());
        println!("    chunk: {}", result.chunk_id);
        println!();
    }
}
