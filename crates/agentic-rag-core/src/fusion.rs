//! Hybrid score fusion of a semantic and a lexical ranked list.
//!
//! # Algorithm
//!
//! 1. Validate the weights and renormalize them to sum to `1.0`.
//! 2. Min-max normalize each list independently to `[0, 1]`.
//! 3. Key every document by a hash of its leading content so the same
//!    passage returned by both indexes merges into one entry.
//! 4. `hybrid = vector_weight × vector + lexical_weight × lexical`, where a
//!    document missing from one list contributes `0.0` for that side.
//! 5. Sort by hybrid score (desc, stable) and truncate to `k`.
//!
//! # Example
//!
//! ```rust
//! use agentic_rag_core::fusion::{fuse, RankedResult};
//!
//! let vector = vec![
//!     RankedResult::new("doc1", 0.9),
//!     RankedResult::new("doc2", 0.7),
//!     RankedResult::new("doc3", 0.5),
//! ];
//! let lexical = vec![
//!     RankedResult::new("doc1", 12.0),
//!     RankedResult::new("doc2", 8.0),
//!     RankedResult::new("doc3", 2.0),
//! ];
//! let fused = fuse(&vector, &lexical, 0.7, 0.3, 2).unwrap();
//! assert_eq!(fused[0].content, "doc1");
//! assert!((fused[1].hybrid_score - 0.53).abs() < 1e-9);
//! ```

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Number of leading characters that identify a document.
pub const KEY_PREFIX_CHARS: usize = 100;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One entry of a ranked list returned by a [`SearchIndex`](crate::index::SearchIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Raw index score. Only its order within one list matters.
    pub score: f64,
}

impl RankedResult {
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            score,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A document after fusion, carrying both normalized components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    /// Dedup key, see [`document_key`].
    pub key: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    /// Normalized semantic score (0.0 if absent from the vector list).
    pub vector_score: f64,
    /// Normalized lexical score (0.0 if absent from the lexical list).
    pub lexical_score: f64,
    pub hybrid_score: f64,
}

/// Validated fusion weights, always summing to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    vector: f64,
    lexical: f64,
}

impl FusionWeights {
    /// Validate and renormalize a weight pair.
    ///
    /// Both weights must be finite and non-negative and their sum must be
    /// positive. When the sum is not `1.0` (within `1e-6`) both weights are
    /// divided by it.
    pub fn new(vector: f64, lexical: f64) -> Result<Self> {
        if !vector.is_finite() || !lexical.is_finite() {
            bail!("fusion weights must be finite (got {}, {})", vector, lexical);
        }
        if vector < 0.0 || lexical < 0.0 {
            bail!(
                "fusion weights must be non-negative (got {}, {})",
                vector,
                lexical
            );
        }
        let sum = vector + lexical;
        if sum <= 0.0 {
            bail!("fusion weights must not both be zero");
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Ok(Self {
                vector: vector / sum,
                lexical: lexical / sum,
            });
        }
        Ok(Self { vector, lexical })
    }

    pub fn vector(&self) -> f64 {
        self.vector
    }

    pub fn lexical(&self) -> f64 {
        self.lexical
    }
}

/// Fuse two ranked lists with raw weights. See the module docs.
pub fn fuse(
    vector_results: &[RankedResult],
    lexical_results: &[RankedResult],
    vector_weight: f64,
    lexical_weight: f64,
    k: usize,
) -> Result<Vec<FusedResult>> {
    let weights = FusionWeights::new(vector_weight, lexical_weight)?;
    Ok(fuse_with(vector_results, lexical_results, weights, k))
}

/// Fuse two ranked lists with pre-validated weights.
pub fn fuse_with(
    vector_results: &[RankedResult],
    lexical_results: &[RankedResult],
    weights: FusionWeights,
    k: usize,
) -> Vec<FusedResult> {
    let norm_vector = normalize_scores(vector_results);
    let norm_lexical = normalize_scores(lexical_results);

    let mut fused: Vec<FusedResult> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (result, score) in vector_results.iter().zip(norm_vector) {
        let key = document_key(&result.content);
        match by_key.get(&key) {
            Some(&idx) => {
                let entry = &mut fused[idx];
                entry.vector_score = entry.vector_score.max(score);
            }
            None => {
                by_key.insert(key.clone(), fused.len());
                fused.push(FusedResult {
                    key,
                    content: result.content.clone(),
                    metadata: result.metadata.clone(),
                    vector_score: score,
                    lexical_score: 0.0,
                    hybrid_score: 0.0,
                });
            }
        }
    }

    for (result, score) in lexical_results.iter().zip(norm_lexical) {
        let key = document_key(&result.content);
        match by_key.get(&key) {
            Some(&idx) => {
                let entry = &mut fused[idx];
                entry.lexical_score = entry.lexical_score.max(score);
            }
            None => {
                by_key.insert(key.clone(), fused.len());
                fused.push(FusedResult {
                    key,
                    content: result.content.clone(),
                    metadata: result.metadata.clone(),
                    vector_score: 0.0,
                    lexical_score: score,
                    hybrid_score: 0.0,
                });
            }
        }
    }

    for entry in &mut fused {
        entry.hybrid_score =
            weights.vector() * entry.vector_score + weights.lexical() * entry.lexical_score;
    }

    // Vec::sort_by is stable, so equal scores keep first-seen order.
    fused.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(k);
    fused
}

/// Min-max normalize raw scores to `[0.0, 1.0]`, preserving input order.
///
/// A single element, or a list whose scores are all equal, normalizes to
/// `0.5` for every member.
pub fn normalize_scores(results: &[RankedResult]) -> Vec<f64> {
    if results.is_empty() {
        return Vec::new();
    }

    let s_min = results
        .iter()
        .map(|r| r.score)
        .fold(f64::INFINITY, f64::min);
    let s_max = results
        .iter()
        .map(|r| r.score)
        .fold(f64::NEG_INFINITY, f64::max);

    results
        .iter()
        .map(|r| {
            if (s_max - s_min).abs() < f64::EPSILON {
                0.5
            } else {
                (r.score - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Dedup key: SHA-256 hex prefix of the trimmed first 100 characters.
pub fn document_key(content: &str) -> String {
    let head: String = content.chars().take(KEY_PREFIX_CHARS).collect();
    let digest = Sha256::digest(head.trim().as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_results(items: &[(&str, f64)]) -> Vec<RankedResult> {
        items
            .iter()
            .map(|(content, score)| RankedResult::new(*content, *score))
            .collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single_is_half() {
        let scores = normalize_scores(&make_results(&[("a", 7.0)]));
        assert_eq!(scores, vec![0.5]);
    }

    #[test]
    fn test_normalize_all_equal_is_half() {
        let scores = normalize_scores(&make_results(&[("a", 3.0), ("b", 3.0)]));
        assert_eq!(scores, vec![0.5, 0.5]);
    }

    #[test]
    fn test_normalize_range() {
        let scores = normalize_scores(&make_results(&[("a", 0.9), ("b", 0.7), ("c", 0.5)]));
        assert!((scores[0] - 1.0).abs() < 1e-9);
        assert!((scores[1] - 0.5).abs() < 1e-9);
        assert!(scores[2].abs() < 1e-9);
    }

    #[test]
    fn test_weights_renormalized() {
        let w = FusionWeights::new(0.9, 0.9).unwrap();
        assert!((w.vector() - 0.5).abs() < 1e-9);
        assert!((w.lexical() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weights_summing_to_one_untouched() {
        let w = FusionWeights::new(0.7, 0.3).unwrap();
        assert_eq!(w.vector(), 0.7);
        assert_eq!(w.lexical(), 0.3);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(FusionWeights::new(-0.1, 1.1).is_err());
        assert!(FusionWeights::new(0.0, 0.0).is_err());
        assert!(FusionWeights::new(f64::NAN, 0.5).is_err());
        assert!(FusionWeights::new(f64::INFINITY, 0.5).is_err());
    }

    #[test]
    fn test_fusion_example_top_two() {
        let vector = make_results(&[("doc1", 0.9), ("doc2", 0.7), ("doc3", 0.5)]);
        let lexical = make_results(&[("doc1", 12.0), ("doc2", 8.0), ("doc3", 2.0)]);
        let fused = fuse(&vector, &lexical, 0.7, 0.3, 2).unwrap();
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].content, "doc1");
        assert!((fused[0].hybrid_score - 1.0).abs() < 1e-9);
        assert_eq!(fused[1].content, "doc2");
        assert!((fused[1].hybrid_score - 0.53).abs() < 1e-9);
        assert!((fused[1].lexical_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_fusion_full_list_bottom_is_zero() {
        let vector = make_results(&[("doc1", 0.9), ("doc2", 0.7), ("doc3", 0.5)]);
        let lexical = make_results(&[("doc1", 12.0), ("doc2", 8.0), ("doc3", 2.0)]);
        let fused = fuse(&vector, &lexical, 0.7, 0.3, 10).unwrap();
        assert_eq!(fused.len(), 3);
        assert!(fused[2].hybrid_score.abs() < 1e-9);
    }

    #[test]
    fn test_document_in_both_lists_appears_once() {
        let vector = make_results(&[("shared passage", 0.8), ("only vector", 0.2)]);
        let lexical = make_results(&[("  shared passage  ", 5.0), ("only lexical", 1.0)]);
        let fused = fuse(&vector, &lexical, 0.5, 0.5, 10).unwrap();
        assert_eq!(fused.len(), 3);
        let shared: Vec<_> = fused
            .iter()
            .filter(|f| f.content.trim() == "shared passage")
            .collect();
        assert_eq!(shared.len(), 1);
        assert!((shared[0].hybrid_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_side_scores_zero() {
        let vector = make_results(&[("a", 1.0), ("b", 0.0)]);
        let fused = fuse(&vector, &[], 0.7, 0.3, 10).unwrap();
        assert_eq!(fused[0].lexical_score, 0.0);
        assert!((fused[0].hybrid_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let vector = make_results(&[("v", 1.0)]);
        let lexical = make_results(&[("l", 1.0)]);
        let fused = fuse(&vector, &lexical, 0.5, 0.5, 10).unwrap();
        assert_eq!(fused[0].content, "v");
        assert_eq!(fused[1].content, "l");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(fuse(&[], &[], 0.7, 0.3, 5).unwrap().is_empty());
    }

    #[test]
    fn test_key_uses_leading_characters_only() {
        let base = "x".repeat(100);
        let a = format!("{}tail one", base);
        let b = format!("{}tail two", base);
        assert_eq!(document_key(&a), document_key(&b));
        assert_ne!(document_key("alpha"), document_key("beta"));
    }
}
