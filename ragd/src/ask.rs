//! `ask`: retrieval plus context assembly, stopping short of generation.
//!
//! Chat generation against Ollama or any other model is an explicit
//! out-of-scope collaborator. `ask` does the retrieval-augmented half of
//! RAG — hybrid search, context formatting, a numbered citation list — and
//! hands the result to an external generator.

use anyhow::Result;
use serde::Serialize;

use ragd_core::context::{CitationEntry, ContextBuilder, ContextBuilderConfig};
use ragd_core::search::{HybridSearcher, SearchParams};

#[derive(Debug, Clone, Serialize)]
pub struct CitedAnswer {
    pub question: String,
    pub context: String,
    pub citations: Vec<CitationEntryDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationEntryDto {
    pub index: usize,
    pub document_id: String,
    pub document_name: String,
    pub location: Option<String>,
}

impl From<CitationEntry> for CitationEntryDto {
    fn from(c: CitationEntry) -> Self {
        Self {
            index: c.index,
            document_id: c.document_id,
            document_name: c.document_name,
            location: c.location,
        }
    }
}

pub async fn ask(
    searcher: &HybridSearcher,
    question: &str,
    search_params: &SearchParams,
    context_config: &ContextBuilderConfig,
) -> Result<CitedAnswer> {
    let results = searcher.search(question, search_params).await?;
    let (context, citations) = ContextBuilder::build(&results, context_config);

    Ok(CitedAnswer {
        question: question.to_string(),
        context,
        citations: citations.into_iter().map(CitationEntryDto::from).collect(),
    })
}
