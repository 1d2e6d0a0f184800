//! Ranked comparison results.

/// One ranked result of `compare` or `classify`.
///
/// `scores` holds one component per requested label, in request order.
/// A component is `None` when neither the query nor the candidate has a
/// signature for that label, and a number in `[0, 1]` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    /// The candidate item key.
    pub key: String,
    /// Per-label similarity components.
    pub scores: Vec<Option<f64>>,
}

impl SimilarityMatch {
    /// Creates a match.
    #[must_use]
    pub fn new(key: impl Into<String>, scores: Vec<Option<f64>>) -> Self {
        Self {
            key: key.into(),
            scores,
        }
    }

    /// Returns the ranking score: the mean of the components that carry data.
    ///
    /// Returns `None` when every component is `None`.
    ///
    /// ```rust
    /// use simidx::SimilarityMatch;
    ///
    /// let m = SimilarityMatch::new("4", vec![Some(1.0), None]);
    /// assert_eq!(m.rank_score(), Some(1.0));
    ///
    /// let m = SimilarityMatch::new("1", vec![Some(1.0), Some(0.0)]);
    /// assert_eq!(m.rank_score(), Some(0.5));
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rank_score(&self) -> Option<f64> {
        let (sum, count) = self
            .scores
            .iter()
            .flatten()
            .fold((0.0, 0_usize), |(sum, count), score| (sum + score, count + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

impl<K: Into<String>> From<(K, Vec<Option<f64>>)> for SimilarityMatch {
    fn from((key, scores): (K, Vec<Option<f64>>)) -> Self {
        Self::new(key, scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_score_ignores_missing_components() {
        let m = SimilarityMatch::new("a", vec![None, Some(0.25), Some(0.75)]);
        assert_eq!(m.rank_score(), Some(0.5));
    }

    #[test]
    fn test_rank_score_all_missing() {
        let m = SimilarityMatch::new("a", vec![None, None]);
        assert_eq!(m.rank_score(), None);
    }

    #[test]
    fn test_from_tuple() {
        let m: SimilarityMatch = ("1", vec![Some(1.0)]).into();
        assert_eq!(m, SimilarityMatch::new("1", vec![Some(1.0)]));
    }
}
