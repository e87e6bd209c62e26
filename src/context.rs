//! Process-wide collaborators shared by every workflow run.
//!
//! A [`WorkflowContext`] is built once from [`Config`] and handed to the
//! planner, orchestrator, reflector and executors. It holds no per-run
//! mutable state, so concurrent runs can share one `Arc<WorkflowContext>`.

use std::sync::Arc;

use agentic_rag_core::index::{Embedder, InMemoryCorpus, LexicalIndex, SearchIndex, VectorIndex};
use anyhow::Result;

use crate::config::{Config, RetrievalConfig, WorkflowConfig};
use crate::corpus::load_corpus;
use crate::embedding::create_embedder;
use crate::llm::{create_model, LanguageModel};
use crate::retrieval::HybridRetriever;

/// Maximum number of source titles listed in planning prompts.
pub const MAX_PROMPT_SOURCES: usize = 10;

pub struct WorkflowContext {
    pub model: Arc<dyn LanguageModel>,
    pub corpus: Arc<InMemoryCorpus>,
    pub retriever: HybridRetriever,
    pub workflow: WorkflowConfig,
}

impl WorkflowContext {
    /// Wire a context from already-built parts. `embed_batch_size` caps the
    /// passages per embedding request.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        corpus: Arc<InMemoryCorpus>,
        embedder: Arc<dyn Embedder>,
        embed_batch_size: usize,
        retrieval: &RetrievalConfig,
        workflow: WorkflowConfig,
    ) -> Result<Self> {
        let vector: Arc<dyn SearchIndex> = Arc::new(
            VectorIndex::new(Arc::clone(&corpus), embedder).with_batch_size(embed_batch_size),
        );
        let lexical: Arc<dyn SearchIndex> = Arc::new(LexicalIndex::new(Arc::clone(&corpus)));
        Ok(Self {
            model,
            retriever: HybridRetriever::new(vector, lexical, retrieval)?,
            corpus,
            workflow,
        })
    }

    /// Build everything the config describes: model, embedder, corpus, indexes.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::from(create_model(&config.llm)?);
        let embedder = create_embedder(&config.embedding)?;
        let corpus = Arc::new(load_corpus(&config.corpus)?);
        tracing::info!(
            model = model.model_name(),
            embedder = embedder.model_name(),
            passages = corpus.len(),
            "workflow context ready"
        );
        Self::new(
            model,
            corpus,
            embedder,
            config.embedding.batch_size,
            &config.retrieval,
            config.workflow.clone(),
        )
    }

    /// Source titles offered to the planner.
    pub fn available_sources(&self) -> Vec<String> {
        self.corpus.titles(MAX_PROMPT_SOURCES)
    }
}
