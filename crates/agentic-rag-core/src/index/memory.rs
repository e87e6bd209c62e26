//! In-memory corpus with BM25 and vector indexes.
//!
//! Both indexes share one [`InMemoryCorpus`] behind an `Arc`. The lexical
//! index is built eagerly; the vector index embeds passages on its first
//! search, `batch_size` at a time, and caches each finished batch behind a
//! `std::sync::RwLock`. A failed batch is retried from that batch on the
//! next search.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::{Embedder, SearchIndex};
use crate::embedding::cosine_similarity;
use crate::fusion::RankedResult;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

/// Passages per `embed_batch` request unless configured otherwise.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// One retrievable unit of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    /// Where the passage came from (relative path, URL, ...).
    pub source: String,
    pub title: Option<String>,
    pub content: String,
}

impl Passage {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            title: None,
            content: content.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title if present, otherwise the source.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source)
    }

    /// Whether the title or source contains any of `names`, ignoring case.
    pub fn matches_any(&self, names: &[String]) -> bool {
        let title = self.display_title().to_lowercase();
        let source = self.source.to_lowercase();
        names.iter().any(|name| {
            let name = name.to_lowercase();
            title.contains(&name) || source.contains(&name)
        })
    }

    fn to_ranked(&self, score: f64) -> RankedResult {
        let mut metadata = Map::new();
        metadata.insert("id".into(), self.id.clone().into());
        metadata.insert("source".into(), self.source.clone().into());
        if let Some(title) = &self.title {
            metadata.insert("title".into(), title.clone().into());
        }
        RankedResult {
            content: self.content.clone(),
            metadata,
            score,
        }
    }
}

/// An immutable list of passages.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    passages: Vec<Passage>,
}

impl InMemoryCorpus {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Display titles of the first `limit` passages.
    pub fn titles(&self, limit: usize) -> Vec<String> {
        self.passages
            .iter()
            .take(limit)
            .map(|p| p.display_title().to_string())
            .collect()
    }
}

/// `true` when no filter is given or the passage matches it.
fn admitted(passage: &Passage, sources: Option<&[String]>) -> bool {
    match sources {
        Some(names) if !names.is_empty() => passage.matches_any(names),
        _ => true,
    }
}

/// Lowercase whitespace tokenization.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

// ═══════════════════════════════════════════════════════════════════════
// BM25
// ═══════════════════════════════════════════════════════════════════════

/// Okapi BM25 over an [`InMemoryCorpus`].
pub struct LexicalIndex {
    corpus: Arc<InMemoryCorpus>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl LexicalIndex {
    pub fn new(corpus: Arc<InMemoryCorpus>) -> Self {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for passage in corpus.passages() {
            let tokens = tokenize(&passage.content);
            doc_lens.push(tokens.len());
            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(tf);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
        };

        Self {
            corpus,
            term_freqs,
            doc_lens,
            doc_freqs,
            avg_doc_len,
        }
    }

    /// Smoothed IDF, always positive.
    fn idf(&self, term: &str) -> f64 {
        let n = self.term_freqs.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of every passage for `query`, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(tf, &len)| {
                let norm = if self.avg_doc_len > 0.0 {
                    len as f64 / self.avg_doc_len
                } else {
                    0.0
                };
                terms
                    .iter()
                    .map(|term| {
                        let f = tf.get(term).copied().unwrap_or(0) as f64;
                        if f == 0.0 {
                            return 0.0;
                        }
                        self.idf(term) * (f * (BM25_K1 + 1.0))
                            / (f + BM25_K1 * (1.0 - BM25_B + BM25_B * norm))
                    })
                    .sum()
            })
            .collect()
    }
}

#[async_trait]
impl SearchIndex for LexicalIndex {
    fn name(&self) -> &str {
        "bm25"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<RankedResult>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let passages = self.corpus.passages();
        let mut scored: Vec<(usize, f64)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(idx, s)| *s > 0.0 && admitted(&passages[*idx], sources))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| passages[idx].to_ranked(score))
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Vector
// ═══════════════════════════════════════════════════════════════════════

/// Brute-force cosine similarity over embedded passages.
pub struct VectorIndex {
    corpus: Arc<InMemoryCorpus>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    /// Embedded batches in corpus order; every batch but the last is full.
    batches: RwLock<Vec<Arc<Vec<Vec<f32>>>>>,
}

impl VectorIndex {
    pub fn new(corpus: Arc<InMemoryCorpus>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            corpus,
            embedder,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Embed at most `batch_size` passages per request (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed whatever batches are not cached yet and return all of them.
    async fn passage_vectors(&self) -> Result<Vec<Arc<Vec<Vec<f32>>>>> {
        let mut batches = self
            .batches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let chunks = self.corpus.passages().chunks(self.batch_size);
        for (i, chunk) in chunks.enumerate().skip(batches.len()) {
            let texts: Vec<String> = chunk.iter().map(|p| p.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("embedding passage batch {}", i + 1))?;
            if vectors.len() != texts.len() {
                bail!(
                    "embedder '{}' returned {} vectors for {} passages",
                    self.embedder.model_name(),
                    vectors.len(),
                    texts.len()
                );
            }

            let vectors = Arc::new(vectors);
            {
                let mut cache = self.batches.write().unwrap_or_else(|e| e.into_inner());
                // A concurrent search may have stored this batch already.
                if cache.len() == i {
                    cache.push(Arc::clone(&vectors));
                }
            }
            batches.push(vectors);
        }

        Ok(batches)
    }
}

#[async_trait]
impl SearchIndex for VectorIndex {
    fn name(&self) -> &str {
        "vector"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<RankedResult>> {
        if self.corpus.is_empty() || query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let batches = self.passage_vectors().await?;
        let query_vec = self.embedder.embed(query).await?;

        let passages = self.corpus.passages();
        let mut scored: Vec<(usize, f64)> = batches
            .iter()
            .flat_map(|batch| batch.iter())
            .enumerate()
            .filter(|(idx, _)| admitted(&passages[*idx], sources))
            .map(|(idx, v)| (idx, cosine_similarity(&query_vec, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| passages[idx].to_ranked(score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn corpus() -> Arc<InMemoryCorpus> {
        Arc::new(InMemoryCorpus::new(vec![
            Passage::new("p1", "loans.md", "Bridging loan rates are currently 0.75% per month")
                .with_title("Loans"),
            Passage::new("p2", "process.md", "The bridging loan process takes two weeks"),
            Passage::new("p3", "cats.md", "Cats sleep for most of the day"),
        ]))
    }

    /// Embeds text as counts of a few fixed keywords and records the size
    /// of every request. Fails the request numbered `fail_call` (1-based).
    #[derive(Default)]
    struct KeywordEmbedder {
        requests: Mutex<Vec<usize>>,
        fail_call: Option<usize>,
    }

    impl KeywordEmbedder {
        fn requests(&self) -> Vec<usize> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(texts.len());
                requests.len()
            };
            if self.fail_call == Some(call) {
                bail!("rate limited");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    ["loan", "rates", "cats"]
                        .iter()
                        .map(|k| lower.matches(k).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize_lowercases() {
        assert_eq!(tokenize("Bridging  LOAN\nrates"), vec!["bridging", "loan", "rates"]);
    }

    #[test]
    fn test_passage_matches_title_or_source_ignoring_case() {
        let p = Passage::new("p1", "docs/loans.md", "x").with_title("Bridging Loans");
        assert!(p.matches_any(&names(&["bridging"])));
        assert!(p.matches_any(&names(&["LOANS.MD"])));
        assert!(!p.matches_any(&names(&["rates"])));
        assert!(!p.matches_any(&[]));
    }

    #[tokio::test]
    async fn test_bm25_ranks_matching_passages() {
        let index = LexicalIndex::new(corpus());
        let results = index.search("bridging loan rates", 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata["id"], "p1");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_bm25_excludes_zero_scores() {
        let index = LexicalIndex::new(corpus());
        let results = index.search("dogs", 10, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_bm25_empty_corpus() {
        let index = LexicalIndex::new(Arc::new(InMemoryCorpus::default()));
        assert!(index.search("anything", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bm25_source_filter_applies_before_k() {
        let index = LexicalIndex::new(corpus());
        let sources = names(&["process"]);
        let results = index
            .search("bridging loan rates", 1, Some(&sources))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["id"], "p2");

        let empty_filter: Vec<String> = Vec::new();
        let unfiltered = index
            .search("bridging loan rates", 10, Some(&empty_filter))
            .await
            .unwrap();
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn test_vector_index_ranks_and_caches() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = VectorIndex::new(corpus(), embedder.clone());

        let results = index.search("cats", 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["source"], "cats.md");

        index.search("loan", 2, None).await.unwrap();
        // One batch for the passages, then one per query.
        assert_eq!(embedder.requests(), vec![3, 1, 1]);
    }

    #[tokio::test]
    async fn test_vector_index_source_filter() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = VectorIndex::new(corpus(), embedder);
        let sources = names(&["Loans"]);

        let results = index.search("cats", 3, Some(&sources)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["id"], "p1");
    }

    #[tokio::test]
    async fn test_vector_index_embeds_in_batches() {
        let passages: Vec<Passage> = (0..150)
            .map(|i| Passage::new(format!("p{}", i), format!("doc{}.md", i), "loan rates"))
            .collect();
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = VectorIndex::new(Arc::new(InMemoryCorpus::new(passages)), embedder.clone())
            .with_batch_size(64);

        let results = index.search("loan", 5, None).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(embedder.requests(), vec![64, 64, 22, 1]);
    }

    #[tokio::test]
    async fn test_vector_index_resumes_after_failed_batch() {
        let passages: Vec<Passage> = (0..5)
            .map(|i| Passage::new(format!("p{}", i), format!("doc{}.md", i), "loan"))
            .collect();
        let embedder = Arc::new(KeywordEmbedder {
            fail_call: Some(2),
            ..Default::default()
        });
        let index = VectorIndex::new(Arc::new(InMemoryCorpus::new(passages)), embedder.clone())
            .with_batch_size(2);

        let err = index.search("loan", 3, None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("embedding passage batch 2"));

        let results = index.search("loan", 3, None).await.unwrap();
        assert_eq!(results.len(), 3);
        // First batch is cached; the retry starts at batch 2.
        assert_eq!(embedder.requests(), vec![2, 2, 2, 1, 1]);
    }

    #[tokio::test]
    async fn test_vector_index_empty_corpus_skips_embedder() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = VectorIndex::new(Arc::new(InMemoryCorpus::default()), embedder.clone());
        assert!(index.search("loan", 3, None).await.unwrap().is_empty());
        assert!(embedder.requests().is_empty());
    }
}
