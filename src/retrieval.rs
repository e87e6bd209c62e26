//! Hybrid retrieval: query both indexes, fuse, explain.
//!
//! A failing index is treated as an empty result list so that, for example,
//! a disabled embedder degrades retrieval to BM25 alone instead of failing
//! the task.

use std::sync::Arc;

use agentic_rag_core::fusion::{fuse_with, FusedResult, FusionWeights};
use agentic_rag_core::index::SearchIndex;
use anyhow::Result;
use serde::Serialize;

use crate::config::RetrievalConfig;

/// Output of one hybrid retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub query: String,
    pub results: Vec<FusedResult>,
    pub vector_count: usize,
    pub lexical_count: usize,
    /// One-line explanation of counts and weights.
    pub reasoning: String,
}

pub struct HybridRetriever {
    vector: Arc<dyn SearchIndex>,
    lexical: Arc<dyn SearchIndex>,
    weights: FusionWeights,
    top_k: usize,
    candidate_k: usize,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<dyn SearchIndex>,
        lexical: Arc<dyn SearchIndex>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        Ok(Self {
            vector,
            lexical,
            weights: FusionWeights::new(config.vector_weight, config.lexical_weight)?,
            top_k: config.top_k,
            candidate_k: config.candidate_k,
        })
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Retrieve up to `top_k` (or the configured default) fused results.
    ///
    /// A non-empty `sources` list restricts both indexes to passages whose
    /// title or source contains one of the names.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        sources: &[String],
    ) -> Retrieval {
        let k = top_k.filter(|k| *k > 0).unwrap_or(self.top_k);
        let candidate_k = self.candidate_k.max(k);
        let filter = (!sources.is_empty()).then_some(sources);

        let vector_results = search_or_empty(self.vector.as_ref(), query, candidate_k, filter).await;
        let lexical_results =
            search_or_empty(self.lexical.as_ref(), query, candidate_k, filter).await;

        let results = fuse_with(&vector_results, &lexical_results, self.weights, k);
        let mut reasoning = format!(
            "Retrieved {} documents via vector search, {} documents via BM25 search, \
             combined into {} unique documents using weights: vector={:.2}, bm25={:.2}",
            vector_results.len(),
            lexical_results.len(),
            results.len(),
            self.weights.vector(),
            self.weights.lexical()
        );
        if let Some(names) = filter {
            reasoning.push_str(&format!(" (restricted to sources: {})", names.join(", ")));
        }
        tracing::info!(query, results = results.len(), sources = ?filter, "hybrid search");

        Retrieval {
            query: query.to_string(),
            vector_count: vector_results.len(),
            lexical_count: lexical_results.len(),
            results,
            reasoning,
        }
    }
}

async fn search_or_empty(
    index: &dyn SearchIndex,
    query: &str,
    k: usize,
    sources: Option<&[String]>,
) -> Vec<agentic_rag_core::fusion::RankedResult> {
    match index.search(query, k, sources).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(index = index.name(), error = %format!("{:#}", e), "index search failed, treating as empty");
            Vec::new()
        }
    }
}
