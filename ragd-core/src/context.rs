//! Assembles a search result list into an LLM-ready context block plus a
//! citation list, and apportions a token budget between chat history and
//! retrieved context.

use crate::models::HybridSearchResult;

const CHARS_PER_TOKEN: usize = 4;

const CITATION_INSTRUCTIONS: &str = "Use inline citation markers like [1] or [1;2] \
immediately after any claim drawn from the sources below. Only cite sources \
listed here; do not invent citation numbers.\n\n";

/// Tuning knobs for [`ContextBuilder::build`].
#[derive(Debug, Clone)]
pub struct ContextBuilderConfig {
    /// Results scoring below this combined score are discarded before
    /// admission.
    pub min_relevance: f64,
    /// Total token budget available to the formatted context block.
    pub max_tokens: usize,
    /// Tokens reserved for the instruction header and surrounding prompt
    /// scaffolding; subtracted from `max_tokens` before converting to chars.
    pub reserved_tokens: usize,
    /// Hard cap on the number of chunks admitted, independent of the token
    /// budget. `None` means no cap.
    pub max_results: Option<usize>,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self { min_relevance: 0.0, max_tokens: 4000, reserved_tokens: 200, max_results: None }
    }
}

/// One entry in the numbered source list accompanying the formatted context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationEntry {
    pub index: usize,
    pub document_id: String,
    pub document_name: String,
    pub location: Option<String>,
}

/// Builds formatted context blocks and citation lists from ranked search
/// results.
pub struct ContextBuilder;

impl ContextBuilder {
    /// Returns `("[No relevant context found]", [])` when nothing survives
    /// the relevance floor or the budget admits nothing.
    pub fn build(results: &[HybridSearchResult], config: &ContextBuilderConfig) -> (String, Vec<CitationEntry>) {
        let eligible: Vec<&HybridSearchResult> = results
            .iter()
            .filter(|r| r.combined_score >= config.min_relevance)
            .collect();

        if eligible.is_empty() {
            return ("[No relevant context found]".to_string(), Vec::new());
        }

        let char_budget = config
            .max_tokens
            .saturating_sub(config.reserved_tokens)
            .saturating_mul(CHARS_PER_TOKEN);

        let mut admitted: Vec<&HybridSearchResult> = Vec::new();
        let mut used_chars = 0usize;

        for result in eligible {
            if let Some(max) = config.max_results {
                if admitted.len() >= max {
                    break;
                }
            }
            let cost = result.content.len();
            if used_chars + cost > char_budget && !admitted.is_empty() {
                break;
            }
            admitted.push(result);
            used_chars += cost;
        }

        if admitted.is_empty() {
            return ("[No relevant context found]".to_string(), Vec::new());
        }

        let mut groups: Vec<(String, Vec<&HybridSearchResult>)> = Vec::new();
        for result in &admitted {
            match groups.iter_mut().find(|(doc_id, _)| doc_id == &result.document_id) {
                Some((_, chunks)) => chunks.push(result),
                None => groups.push((result.document_id.clone(), vec![result])),
            }
        }

        let mut citations = Vec::with_capacity(groups.len());
        let mut blocks = Vec::with_capacity(groups.len());

        for (index, (document_id, chunks)) in groups.into_iter().enumerate() {
            let index = index + 1;
            let first = chunks[0];
            citations.push(CitationEntry {
                index,
                document_id: document_id.clone(),
                document_name: first.document_name.clone(),
                location: first.location.clone(),
            });

            let avg_score = chunks.iter().map(|c| c.combined_score).sum::<f64>() / chunks.len() as f64;
            let mut header = format!("[{index}] {}", first.document_name);
            if let Some(loc) = &first.location {
                header.push_str(&format!(", {loc}"));
            }
            header.push_str(&format!(", avg_score={avg_score:.3}"));

            let body = chunks
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n[...]\n\n");
            blocks.push(format!("{header}\n{body}"));
        }

        let formatted = format!("{CITATION_INSTRUCTIONS}{}", blocks.join("\n\n"));
        (formatted, citations)
    }
}

/// Splits a total token budget between chat history and retrieved context.
///
/// Context is preferred over history when the two minimums can't both be
/// satisfied: history is shrunk first, down to zero if necessary, before
/// context gives up any of its minimum.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    /// Fraction of the total budget history gets when there's no conflict.
    pub history_ratio: f64,
    pub min_history: usize,
    pub min_context: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self { history_ratio: 0.3, min_history: 200, min_context: 500 }
    }
}

impl TokenBudget {
    /// Returns `(history_tokens, context_tokens)`.
    pub fn allocate(&self, total_budget: usize) -> (usize, usize) {
        let raw_history = ((total_budget as f64) * self.history_ratio) as usize;
        let history = raw_history.max(self.min_history);
        let context = total_budget.saturating_sub(history).max(self.min_context);

        if history + context <= total_budget {
            return (history, context);
        }

        let context = self.min_context.max(total_budget.saturating_sub(self.min_history));
        let context = context.min(total_budget);
        let history = total_budget.saturating_sub(context);
        (history, context)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn result(chunk_id: &str, doc_id: &str, doc_name: &str, content: &str, score: f64) -> HybridSearchResult {
        HybridSearchResult {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            document_name: doc_name.to_string(),
            content: content.to_string(),
            combined_score: score,
            semantic_score: score,
            keyword_score: score,
            rrf_score: 0.0,
            location: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn empty_results_yield_placeholder() {
        let (text, citations) = ContextBuilder::build(&[], &ContextBuilderConfig::default());
        assert_eq!(text, "[No relevant context found]");
        assert!(citations.is_empty());
    }

    #[test]
    fn below_min_relevance_is_discarded() {
        let results = vec![result("c1", "d1", "Doc One", "some content", 0.1)];
        let config = ContextBuilderConfig { min_relevance: 0.5, ..Default::default() };
        let (text, citations) = ContextBuilder::build(&results, &config);
        assert_eq!(text, "[No relevant context found]");
        assert!(citations.is_empty());
    }

    #[test]
    fn admits_and_numbers_distinct_documents() {
        let results = vec![
            result("d1#0", "d1", "Doc One", "alpha content", 0.9),
            result("d2#0", "d2", "Doc Two", "beta content", 0.8),
        ];
        let (text, citations) = ContextBuilder::build(&results, &ContextBuilderConfig::default());
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].index, 1);
        assert_eq!(citations[1].index, 2);
        assert!(text.contains("[1] Doc One"));
        assert!(text.contains("[2] Doc Two"));
    }

    #[test]
    fn chunks_from_same_document_share_one_citation() {
        let results = vec![
            result("d1#0", "d1", "Doc One", "alpha content", 0.9),
            result("d1#1", "d1", "Doc One", "more alpha content", 0.85),
        ];
        let (text, citations) = ContextBuilder::build(&results, &ContextBuilderConfig::default());
        assert_eq!(citations.len(), 1);
        assert!(text.contains("alpha content"));
        assert!(text.contains("more alpha content"));
        assert!(text.contains("alpha content\n\n[...]\n\nmore alpha content"));
    }

    #[test]
    fn header_carries_average_score_across_grouped_chunks() {
        let results = vec![
            result("d1#0", "d1", "Doc One", "alpha content", 0.9),
            result("d1#1", "d1", "Doc One", "more alpha content", 0.7),
        ];
        let (text, _) = ContextBuilder::build(&results, &ContextBuilderConfig::default());
        assert!(text.contains("[1] Doc One, avg_score=0.800"));
    }

    #[test]
    fn max_results_stops_admission_even_under_budget() {
        let results = vec![
            result("d1#0", "d1", "Doc One", "x", 0.9),
            result("d2#0", "d2", "Doc Two", "y", 0.8),
            result("d3#0", "d3", "Doc Three", "z", 0.7),
        ];
        let config = ContextBuilderConfig { max_results: Some(2), ..Default::default() };
        let (_, citations) = ContextBuilder::build(&results, &config);
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn char_budget_truncates_results() {
        let results = vec![
            result("d1#0", "d1", "Doc One", &"a".repeat(100), 0.9),
            result("d2#0", "d2", "Doc Two", &"b".repeat(100), 0.8),
        ];
        let config = ContextBuilderConfig { max_tokens: 40, reserved_tokens: 10, ..Default::default() };
        let (_, citations) = ContextBuilder::build(&results, &config);
        assert_eq!(citations.len(), 1);
    }

    #[test]
    fn first_result_always_admitted_even_if_it_alone_exceeds_budget() {
        let results = vec![result("d1#0", "d1", "Doc One", &"a".repeat(1000), 0.9)];
        let config = ContextBuilderConfig { max_tokens: 10, reserved_tokens: 5, ..Default::default() };
        let (text, citations) = ContextBuilder::build(&results, &config);
        assert_eq!(citations.len(), 1);
        assert!(text.contains("Doc One"));
    }

    #[test]
    fn instructions_are_prepended() {
        let results = vec![result("d1#0", "d1", "Doc One", "content", 0.9)];
        let (text, _) = ContextBuilder::build(&results, &ContextBuilderConfig::default());
        assert!(text.starts_with("Use inline citation markers"));
    }

    #[test]
    fn token_budget_splits_by_ratio_when_unconstrained() {
        let budget = TokenBudget { history_ratio: 0.3, min_history: 0, min_context: 0 };
        let (history, context) = budget.allocate(1000);
        assert_eq!(history, 300);
        assert_eq!(context, 700);
    }

    #[test]
    fn token_budget_prefers_context_when_minimums_conflict() {
        let budget = TokenBudget { history_ratio: 0.5, min_history: 800, min_context: 800 };
        let (history, context) = budget.allocate(1000);
        assert_eq!(context, 800);
        assert_eq!(history, 200);
    }
}
