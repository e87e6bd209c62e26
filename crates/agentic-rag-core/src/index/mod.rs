//! Index and embedding abstractions used by hybrid retrieval.
//!
//! The retriever queries two [`SearchIndex`] implementations, one semantic
//! and one lexical, and fuses their ranked lists with
//! [`fuse`](crate::fusion::fuse). Scores returned by an index are raw; only
//! their order within one list matters.
//!
//! # Implementations
//!
//! | Type | Module |
//! |------|--------|
//! | [`LexicalIndex`] | BM25 over an [`InMemoryCorpus`] |
//! | [`VectorIndex`] | Cosine similarity over lazily embedded passages |

pub mod memory;

pub use memory::{InMemoryCorpus, LexicalIndex, Passage, VectorIndex, DEFAULT_EMBED_BATCH_SIZE};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::fusion::RankedResult;

/// A ranked search over some document collection.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Short name used in logs (e.g. `"bm25"`).
    fn name(&self) -> &str;

    /// Return at most `k` results, best first.
    ///
    /// With `sources`, only documents whose title or source contains one of
    /// the names (case-insensitive) are considered, before `k` is applied.
    async fn search(
        &self,
        query: &str,
        k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<RankedResult>>;
}

/// Produces embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector"))
    }
}
