//! Vector math for [`VectorIndex`](crate::index::VectorIndex).

/// Score of a passage vector against a query vector.
///
/// Cosine similarity accumulated in `f64`, since the value is used directly
/// as a raw search score and then min–max normalized against its
/// neighbours. A dimension mismatch (an embedder changed under a cached
/// index) or a zero vector scores `0.0` instead of failing the search, so a
/// single bad passage only sinks itself.
pub fn cosine_similarity(query: &[f32], passage: &[f32]) -> f64 {
    if query.len() != passage.len() || query.is_empty() {
        return 0.0;
    }

    let (dot, query_sq, passage_sq) = query.iter().zip(passage).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, qq, pp), (&q, &p)| {
            let (q, p) = (f64::from(q), f64::from(p));
            (dot + q * p, qq + q * q, pp + p * p)
        },
    );

    let norm = (query_sq * passage_sq).sqrt();
    if norm <= f64::EPSILON {
        return 0.0;
    }
    (dot / norm).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_direction_scores_one() {
        let v = [0.3, 0.4, 0.5];
        let scaled = [3.0, 4.0, 5.0];
        assert!((cosine_similarity(&v, &scaled) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch_scores_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
