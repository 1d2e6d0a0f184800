//! Similarity scoring and result ranking.

use super::Banding;
use crate::models::{Signature, SimilarityMatch};
use std::cmp::Ordering;

/// Estimates the Jaccard similarity of two signatures.
///
/// Identical signatures score exactly `1.0`. Signatures of different lengths
/// were built under different configurations and score `0.0`.
///
/// ```rust
/// use simidx::{Signature, compare_signatures};
///
/// let a = Signature::new(vec![1, 2, 3, 4]);
/// let b = Signature::new(vec![1, 2, 0, 0]);
/// assert_eq!(compare_signatures(&a, &a), 1.0);
/// assert_eq!(compare_signatures(&a, &b), 0.5);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compare_signatures(a: &Signature, b: &Signature) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    Banding::bit_count(a, b) as f64 / a.len() as f64
}

/// Scores one label for a query/candidate pair.
///
/// | Query | Candidate | Score |
/// |-------|-----------|-------|
/// | present | present | `Some(compare_signatures)` |
/// | present | absent | `Some(0.0)` |
/// | absent | present | `Some(0.0)` |
/// | absent | absent | `None` |
#[must_use]
pub fn component_score(query: Option<&Signature>, candidate: Option<&Signature>) -> Option<f64> {
    match (query, candidate) {
        (Some(q), Some(c)) => Some(compare_signatures(q, c)),
        (None, None) => None,
        _ => Some(0.0),
    }
}

/// Sorts matches by descending rank score, ties by ascending key, then
/// truncates to `limit`.
pub fn rank(matches: &mut Vec<SimilarityMatch>, limit: Option<usize>) {
    matches.sort_by(|a, b| {
        let (sa, sb) = (a.rank_score(), b.rank_score());
        match (sa, sb) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.key.cmp(&b.key))
    });
    if let Some(limit) = limit {
        matches.truncate(limit);
    }
}
