//! Hybrid search: fan out to the vector and keyword stores, fuse, rank.
//!
//! The core search algorithm operates entirely through the [`VectorStore`]
//! and [`KeywordStore`] trait contracts, with no database dependency. The
//! calling application is responsible for constructing the stores and an
//! [`EmbeddingProvider`] and passing them in.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Embed the query (skipped in keyword-only mode).
//! 2. Parse the query into an AST and transform it to an FTS expression
//!    (skipped in semantic-only mode).
//! 3. Fan out to both stores, overfetching beyond the requested limit so
//!    fusion has room to reorder.
//! 4. Normalize keyword scores with min-max (vector scores already arrive
//!    normalized to `[0, 1]` from the store adapter).
//! 5. Fuse: `combined = w_semantic * semantic + w_keyword * keyword`.
//! 6. Compute a reciprocal-rank-fusion score per chunk as a tie-break.
//! 7. Sort by combined score, then RRF score, then chunk id; truncate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::EmbeddingProvider;
use crate::models::{BranchHit, HybridSearchResult, SearchMode};
use crate::query::{parse_query, Fts5Transformer};
use crate::store::{KeywordStore, VectorFilter, VectorStore};

/// Constant `k` in the reciprocal-rank-fusion formula `1 / (k + rank)`.
/// Larger `k` flattens the influence of rank; 60 is the standard choice
/// from the TREC literature and requires no tuning per corpus.
pub const RRF_K: f64 = 60.0;

/// Overfetch multiplier applied to `limit` before fusion narrows back down.
const OVERFETCH_FACTOR: usize = 4;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub mode: SearchMode,
    /// Weight applied to the normalized semantic score.
    pub weight_semantic: f64,
    /// Weight applied to the normalized keyword score.
    pub weight_keyword: f64,
    /// Maximum results to return.
    pub limit: usize,
    /// Opaque metadata filter passed to both stores.
    pub filter: Option<VectorFilter>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            weight_semantic: 0.5,
            weight_keyword: 0.5,
            limit: 10,
            filter: None,
        }
    }
}

/// Fans a query out to the vector and keyword stores and fuses the results.
pub struct HybridSearcher {
    vectors: Arc<dyn VectorStore>,
    keywords: Arc<dyn KeywordStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl HybridSearcher {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        keywords: Arc<dyn KeywordStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { vectors, keywords, embeddings }
    }

    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<HybridSearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let overfetch = params.limit * OVERFETCH_FACTOR;

        let semantic_hits = if matches!(params.mode, SearchMode::Semantic | SearchMode::Hybrid) {
            let embedding = self.embeddings.embed_one(query).await?;
            self.vectors
                .search(&embedding, overfetch, params.filter.as_ref())
                .await?
        } else {
            Vec::new()
        };

        let keyword_hits = if matches!(params.mode, SearchMode::Keyword | SearchMode::Hybrid) {
            let ast = parse_query(query).map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let fts_expression = Fts5Transformer::transform(&ast);
            self.keywords
                .search(&fts_expression, overfetch, params.filter.as_ref())
                .await?
        } else {
            Vec::new()
        };

        if semantic_hits.is_empty() && keyword_hits.is_empty() {
            return Ok(Vec::new());
        }

        let (weight_semantic, weight_keyword) = match params.mode {
            SearchMode::Semantic => (1.0, 0.0),
            SearchMode::Keyword => (0.0, 1.0),
            SearchMode::Hybrid => (params.weight_semantic, params.weight_keyword),
        };

        let norm_semantic: HashMap<&str, f64> =
            semantic_hits.iter().map(|h| (h.chunk_id.as_str(), h.raw_score)).collect();
        let norm_keyword = normalize_scores(&keyword_hits);

        let semantic_rank: HashMap<&str, usize> = semantic_hits
            .iter()
            .enumerate()
            .map(|(rank, h)| (h.chunk_id.as_str(), rank))
            .collect();
        let keyword_rank: HashMap<&str, usize> = keyword_hits
            .iter()
            .enumerate()
            .map(|(rank, h)| (h.chunk_id.as_str(), rank))
            .collect();

        let mut fused: HashMap<String, &BranchHit> = HashMap::new();
        for hit in semantic_hits.iter().chain(keyword_hits.iter()) {
            fused.entry(hit.chunk_id.clone()).or_insert(hit);
        }

        let mut results: Vec<HybridSearchResult> = fused
            .into_iter()
            .map(|(chunk_id, hit)| {
                let semantic_score = norm_semantic.get(chunk_id.as_str()).copied().unwrap_or(0.0);
                let keyword_score = norm_keyword.get(chunk_id.as_str()).copied().unwrap_or(0.0);
                let combined_score = weight_semantic * semantic_score + weight_keyword * keyword_score;

                let mut rrf_score = 0.0;
                if let Some(rank) = semantic_rank.get(chunk_id.as_str()) {
                    rrf_score += 1.0 / (RRF_K + (*rank + 1) as f64);
                }
                if let Some(rank) = keyword_rank.get(chunk_id.as_str()) {
                    rrf_score += 1.0 / (RRF_K + (*rank + 1) as f64);
                }

                HybridSearchResult {
                    chunk_id: chunk_id.clone(),
                    document_id: hit.document_id.clone(),
                    document_name: document_name(hit),
                    content: hit.content.clone(),
                    combined_score,
                    semantic_score,
                    keyword_score,
                    rrf_score,
                    location: location(hit),
                    metadata: hit.metadata.clone(),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.rrf_score
                        .partial_cmp(&a.rrf_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        results.truncate(params.limit);
        Ok(results)
    }
}

/// Run a keyword-only or semantic-only search without constructing a full
/// [`HybridSearcher`]. Used by callers that already hold the mode decision
/// and want to skip validating weights.
pub fn effective_weights(mode: SearchMode, weight_semantic: f64, weight_keyword: f64) -> Result<(f64, f64)> {
    match mode {
        SearchMode::Semantic => Ok((1.0, 0.0)),
        SearchMode::Keyword => Ok((0.0, 1.0)),
        SearchMode::Hybrid => {
            if weight_semantic < 0.0 || weight_keyword < 0.0 {
                bail!("search weights must be non-negative");
            }
            Ok((weight_semantic, weight_keyword))
        }
    }
}

fn document_name(hit: &BranchHit) -> String {
    hit.metadata
        .get("title")
        .and_then(|v| v.as_str())
        .or_else(|| hit.metadata.get("document_name").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| hit.document_id.clone())
}

fn location(hit: &BranchHit) -> Option<String> {
    hit.metadata.get("location").and_then(|v| v.as_str()).map(str::to_string)
}

/// Min-max normalize raw branch scores to `[0.0, 1.0]`, keyed by chunk id.
///
/// If all scores are equal, they normalize to `1.0`. Empty input yields an
/// empty map.
fn normalize_scores(hits: &[BranchHit]) -> HashMap<&str, f64> {
    if hits.is_empty() {
        return HashMap::new();
    }

    let s_min = hits.iter().map(|h| h.raw_score).fold(f64::INFINITY, f64::min);
    let s_max = hits.iter().map(|h| h.raw_score).fold(f64::NEG_INFINITY, f64::max);

    hits.iter()
        .map(|h| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (h.raw_score - s_min) / (s_max - s_min)
            };
            (h.chunk_id.as_str(), norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: &str, doc_id: &str, score: f64) -> BranchHit {
        BranchHit {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            content: String::new(),
            raw_score: score,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn normalize_single_is_one() {
        let hits = vec![hit("c1", "d1", 5.0)];
        let norm = normalize_scores(&hits);
        assert!((norm["c1"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_spreads_across_unit_range() {
        let hits = vec![hit("c1", "d1", 10.0), hit("c2", "d2", 5.0), hit("c3", "d3", 0.0)];
        let norm = normalize_scores(&hits);
        assert!((norm["c1"] - 1.0).abs() < 1e-9);
        assert!((norm["c2"] - 0.5).abs() < 1e-9);
        assert!((norm["c3"] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_all_equal_is_one() {
        let hits = vec![hit("c1", "d1", 3.0), hit("c2", "d2", 3.0)];
        let norm = normalize_scores(&hits);
        assert!((norm["c1"] - 1.0).abs() < 1e-9);
        assert!((norm["c2"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn effective_weights_keyword_mode_zeroes_semantic() {
        let (sem, kw) = effective_weights(SearchMode::Keyword, 0.5, 0.5).unwrap();
        assert_eq!(sem, 0.0);
        assert_eq!(kw, 1.0);
    }

    #[test]
    fn effective_weights_semantic_mode_zeroes_keyword() {
        let (sem, kw) = effective_weights(SearchMode::Semantic, 0.5, 0.5).unwrap();
        assert_eq!(sem, 1.0);
        assert_eq!(kw, 0.0);
    }

    #[test]
    fn effective_weights_hybrid_passes_through() {
        let (sem, kw) = effective_weights(SearchMode::Hybrid, 0.9, 0.1).unwrap();
        assert_eq!(sem, 0.9);
        assert_eq!(kw, 0.1);
    }

    // Literal fusion scenario: document B (semantic 0.70, keyword 0.80) beats
    // document A (semantic 0.90, keyword 0.00) under equal weights, but A wins
    // once semantic weight dominates.
    #[test]
    fn fusion_weighting_flips_winner() {
        let a_sem = 0.90;
        let a_kw = 0.00;
        let b_sem = 0.70;
        let b_kw = 0.80;

        let combined = |sem: f64, kw: f64, w_sem: f64, w_kw: f64| w_sem * sem + w_kw * kw;

        let a_equal = combined(a_sem, a_kw, 0.5, 0.5);
        let b_equal = combined(b_sem, b_kw, 0.5, 0.5);
        assert!(b_equal > a_equal);
        assert!((a_equal - 0.45).abs() < 1e-9);
        assert!((b_equal - 0.75).abs() < 1e-9);

        let a_semantic_heavy = combined(a_sem, a_kw, 0.9, 0.1);
        let b_semantic_heavy = combined(b_sem, b_kw, 0.9, 0.1);
        assert!(a_semantic_heavy > b_semantic_heavy);
        assert!((a_semantic_heavy - 0.81).abs() < 1e-9);
    }

    #[test]
    fn rrf_score_rewards_top_rank() {
        let rrf = |rank: usize| 1.0 / (RRF_K + (rank + 1) as f64);
        assert!(rrf(0) > rrf(1));
        assert!(rrf(1) > rrf(10));
    }

    struct StubVectors(Vec<BranchHit>);

    #[async_trait::async_trait]
    impl VectorStore for StubVectors {
        fn dimension(&self) -> usize {
            1
        }
        fn supports_metadata_filtering(&self) -> bool {
            false
        }
        async fn add(&self, _records: &[crate::models::VectorRecord]) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _q: &[f32], _limit: usize, _filter: Option<&VectorFilter>) -> Result<Vec<BranchHit>> {
            Ok(self.0.clone())
        }
        async fn get(&self, ids: &[String]) -> Result<Vec<Option<crate::models::VectorRecord>>> {
            Ok(ids.iter().map(|_| None).collect())
        }
        async fn delete(&self, _ids: &[String]) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
        async fn exists(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn persist(&self) -> Result<()> {
            Ok(())
        }
        async fn reset(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct StubKeywords(Vec<BranchHit>);

    #[async_trait::async_trait]
    impl KeywordStore for StubKeywords {
        async fn add(&self, _records: &[crate::models::KeywordRecord]) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _q: &str, _limit: usize, _filter: Option<&VectorFilter>) -> Result<Vec<BranchHit>> {
            Ok(self.0.clone())
        }
        async fn delete(&self, _ids: &[String]) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
        async fn exists(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    // Seed scenario 5: A(semantic=0.90, keyword=0.00) vs B(semantic=0.70,
    // keyword=0.80) at equal weights. Semantic scores arrive pre-normalized
    // from the store and must not be min-maxed a second time, or A's lone
    // high semantic score would get inflated to 1.0 and tie with B.
    #[tokio::test]
    async fn hybrid_search_does_not_renormalize_semantic_branch() {
        let vectors = Arc::new(StubVectors(vec![
            hit("a", "doc-a", 0.90),
            hit("b", "doc-b", 0.70),
        ]));
        let keywords = Arc::new(StubKeywords(vec![hit("b", "doc-b", 0.80)]));
        let searcher = HybridSearcher::new(vectors, keywords, Arc::new(StubEmbedder));

        let params = SearchParams {
            mode: SearchMode::Hybrid,
            weight_semantic: 0.5,
            weight_keyword: 0.5,
            limit: 10,
            filter: None,
        };
        let results = searcher.search("test query", &params).await.unwrap();

        let a = results.iter().find(|r| r.chunk_id == "a").unwrap();
        let b = results.iter().find(|r| r.chunk_id == "b").unwrap();

        assert!((a.combined_score - 0.45).abs() < 1e-9);
        assert!((b.combined_score - 0.75).abs() < 1e-9);
        assert_eq!(results[0].chunk_id, "b");
    }
}
