//! Citation marker extraction and validation.
//!
//! [`CitationExtractor`] scans generated text for `[N]` / `[N;M]` markers.
//! [`CitationValidator`] checks each extracted claim against the source
//! preview it cites, combining keyword overlap with an optional semantic
//! similarity signal.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

const KEYWORD_VALID_THRESHOLD: f64 = 0.30;
const KEYWORD_WEAK_THRESHOLD: f64 = 0.15;
const SEMANTIC_VALID_THRESHOLD: f64 = 0.70;
const SEMANTIC_WEAK_THRESHOLD: f64 = 0.50;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "has", "had", "was", "were",
    "been", "being", "this", "that", "these", "those", "with", "from", "into", "onto", "over",
    "under", "about", "above", "below", "between", "through", "during", "before", "after",
    "then", "than", "also", "just", "only", "its", "his", "her", "their", "our", "your", "who",
    "whom", "which", "what", "when", "where", "why", "how", "will", "would", "could", "should",
    "may", "might", "must", "shall", "does", "did", "doing", "have", "having", "they", "them",
    "she", "him", "himself", "herself", "itself", "themselves", "ourselves", "yourself",
    "yourselves", "because", "while", "out", "off", "down", "upon", "per", "via", "any", "each",
    "few", "more", "most", "other", "some", "such", "own", "same", "too", "very", "one", "two",
    "there", "here", "yet", "again", "once",
];

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d+(?:;\d+)*\]").unwrap())
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]+").unwrap())
}

/// A citation marker found in generated text, together with the claim it
/// supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCitation {
    pub marker_text: String,
    pub citation_indices: Vec<usize>,
    pub claim_text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Scans text for `[N]` / `[N;M;...]` markers.
pub struct CitationExtractor;

impl CitationExtractor {
    pub fn extract(text: &str) -> Vec<ExtractedCitation> {
        let mut out = Vec::new();
        for m in marker_regex().find_iter(text) {
            let indices: Vec<usize> = m
                .as_str()
                .trim_matches(|c| c == '[' || c == ']')
                .split(';')
                .filter_map(|s| s.parse::<usize>().ok())
                .collect();
            let (sentence_start, sentence_end) = sentence_span(text, m.start(), m.end());
            let raw_sentence = &text[sentence_start..sentence_end];
            let claim_text = marker_regex().replace_all(raw_sentence, "").trim().to_string();
            out.push(ExtractedCitation {
                marker_text: m.as_str().to_string(),
                citation_indices: indices,
                claim_text,
                char_start: m.start(),
                char_end: m.end(),
            });
        }
        out
    }
}

/// Find the byte range of the sentence surrounding `[marker_start, marker_end)`.
fn sentence_span(text: &str, marker_start: usize, marker_end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();

    let mut start = marker_start;
    while start > 0 {
        let c = bytes[start - 1];
        if matches!(c, b'.' | b'!' | b'?') {
            break;
        }
        start -= 1;
    }
    while start < marker_start && (text.as_bytes()[start] as char).is_whitespace() {
        start += 1;
    }

    let mut end = marker_end;
    while end < bytes.len() {
        let c = bytes[end];
        if matches!(c, b'.' | b'!' | b'?') {
            end += 1;
            break;
        }
        end += 1;
    }

    (start, end.min(text.len()))
}

/// Outcome of validating a single citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Weak,
    Invalid,
    OutOfRange,
}

/// How a caller should react to validation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Report only; caller takes no action.
    Warn,
    /// Caller may drop invalid markers from the response.
    Filter,
    /// Caller flags the whole response as untrustworthy.
    Strict,
}

/// Result of validating one extracted citation against its source.
#[derive(Debug, Clone)]
pub struct CitationValidation {
    pub index: usize,
    pub claim: String,
    pub result: ValidationResult,
    pub confidence: f64,
}

/// Aggregate validation outcome for a full response.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub validations: Vec<CitationValidation>,
    pub unused_citations: Vec<usize>,
    pub overall_confidence: f64,
}

impl ValidationReport {
    pub fn valid_count(&self) -> usize {
        self.validations
            .iter()
            .filter(|v| v.result == ValidationResult::Valid)
            .count()
    }

    pub fn weak_count(&self) -> usize {
        self.validations
            .iter()
            .filter(|v| v.result == ValidationResult::Weak)
            .count()
    }

    pub fn invalid_count(&self) -> usize {
        self.validations
            .iter()
            .filter(|v| v.result == ValidationResult::Invalid)
            .count()
    }

    pub fn has_hallucinations(&self) -> bool {
        self.validations
            .iter()
            .any(|v| matches!(v.result, ValidationResult::Invalid | ValidationResult::OutOfRange))
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn keyword_overlap(claim: &str, source_preview: &str) -> f64 {
    let claim_tokens = tokenize(claim);
    if claim_tokens.is_empty() {
        return 0.0;
    }
    let source_tokens = tokenize(source_preview);
    let overlap = claim_tokens.intersection(&source_tokens).count();
    overlap as f64 / claim_tokens.len() as f64
}

/// Validates extracted citations against the source previews presented to
/// the generator.
pub struct CitationValidator;

impl CitationValidator {
    /// `citation_previews` is 1-indexed: `citation_previews[i-1]` is the
    /// preview text for citation `i`. `semantic_similarity`, if provided, is
    /// called as `f(claim, source_preview) -> cosine similarity`.
    pub fn validate(
        citations: &[ExtractedCitation],
        citation_previews: &[String],
        semantic_similarity: Option<&dyn Fn(&str, &str) -> f64>,
    ) -> ValidationReport {
        let mut validations = Vec::new();
        let mut used: HashSet<usize> = HashSet::new();

        for citation in citations {
            for &index in &citation.citation_indices {
                used.insert(index);
                if index < 1 || index > citation_previews.len() {
                    validations.push(CitationValidation {
                        index,
                        claim: citation.claim_text.clone(),
                        result: ValidationResult::OutOfRange,
                        confidence: 0.0,
                    });
                    continue;
                }

                let preview = &citation_previews[index - 1];
                let overlap = keyword_overlap(&citation.claim_text, preview);

                if overlap >= KEYWORD_VALID_THRESHOLD {
                    validations.push(CitationValidation {
                        index,
                        claim: citation.claim_text.clone(),
                        result: ValidationResult::Valid,
                        confidence: (overlap + 0.3).min(1.0),
                    });
                    continue;
                }

                let semantic = semantic_similarity.map(|f| f(&citation.claim_text, preview));
                if let Some(sim) = semantic {
                    if sim >= SEMANTIC_VALID_THRESHOLD {
                        validations.push(CitationValidation {
                            index,
                            claim: citation.claim_text.clone(),
                            result: ValidationResult::Valid,
                            confidence: sim,
                        });
                        continue;
                    }
                    if sim >= SEMANTIC_WEAK_THRESHOLD {
                        validations.push(CitationValidation {
                            index,
                            claim: citation.claim_text.clone(),
                            result: ValidationResult::Weak,
                            confidence: 0.8 * sim,
                        });
                        continue;
                    }
                }

                if overlap >= KEYWORD_WEAK_THRESHOLD {
                    validations.push(CitationValidation {
                        index,
                        claim: citation.claim_text.clone(),
                        result: ValidationResult::Weak,
                        confidence: overlap + 0.2,
                    });
                    continue;
                }

                validations.push(CitationValidation {
                    index,
                    claim: citation.claim_text.clone(),
                    result: ValidationResult::Invalid,
                    confidence: 0.3 * overlap.max(semantic.unwrap_or(0.0)),
                });
            }
        }

        let unused_citations: Vec<usize> = (1..=citation_previews.len())
            .filter(|i| !used.contains(i))
            .collect();

        let overall_confidence = if validations.is_empty() {
            1.0
        } else {
            validations.iter().map(|v| v.confidence).sum::<f64>() / validations.len() as f64
        };

        ValidationReport {
            validations,
            unused_citations,
            overall_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_marker() {
        let citations = CitationExtractor::extract("Rust is fast [1].");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].citation_indices, vec![1]);
        assert!(citations[0].claim_text.contains("Rust is fast"));
        assert!(!citations[0].claim_text.contains('['));
    }

    #[test]
    fn extracts_multi_source_marker() {
        let citations = CitationExtractor::extract("Both agree [1;2].");
        assert_eq!(citations[0].citation_indices, vec![1, 2]);
    }

    #[test]
    fn no_markers_yields_empty() {
        assert!(CitationExtractor::extract("No citations here.").is_empty());
    }

    #[test]
    fn valid_citation_on_high_keyword_overlap() {
        let citations = vec![ExtractedCitation {
            marker_text: "[1]".into(),
            citation_indices: vec![1],
            claim_text: "Rust provides memory safety without garbage collection".into(),
            char_start: 0,
            char_end: 3,
        }];
        let previews = vec![
            "Rust provides memory safety without a garbage collector by using ownership."
                .to_string(),
        ];
        let report = CitationValidator::validate(&citations, &previews, None);
        assert_eq!(report.validations[0].result, ValidationResult::Valid);
    }

    #[test]
    fn out_of_range_index_is_flagged() {
        let citations = vec![ExtractedCitation {
            marker_text: "[5]".into(),
            citation_indices: vec![5],
            claim_text: "something".into(),
            char_start: 0,
            char_end: 3,
        }];
        let previews = vec!["only one preview".to_string()];
        let report = CitationValidator::validate(&citations, &previews, None);
        assert_eq!(report.validations[0].result, ValidationResult::OutOfRange);
        assert_eq!(report.validations[0].confidence, 0.0);
        assert!(report.has_hallucinations());
    }

    #[test]
    fn hallucination_scenario_from_unrelated_preview() {
        let text = "Data sovereignty enables sovereign control [1].";
        let citations = CitationExtractor::extract(text);
        let previews =
            vec!["Visitors preserve heritage of artists they followed.".to_string()];
        let report = CitationValidator::validate(&citations, &previews, None);
        assert_eq!(report.valid_count(), 0);
        assert!(report.invalid_count() >= 1);
        assert!(report.has_hallucinations());
    }

    #[test]
    fn unused_citations_are_reported() {
        let citations = vec![ExtractedCitation {
            marker_text: "[1]".into(),
            citation_indices: vec![1],
            claim_text: "x".into(),
            char_start: 0,
            char_end: 3,
        }];
        let previews = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = CitationValidator::validate(&citations, &previews, None);
        assert_eq!(report.unused_citations, vec![2, 3]);
    }

    #[test]
    fn overall_confidence_is_one_when_no_validations() {
        let report = CitationValidator::validate(&[], &[], None);
        assert_eq!(report.overall_confidence, 1.0);
    }
}
