//! MinHash signature value type.

use std::fmt;

/// A MinHash signature: one minimum hash value per permutation.
///
/// Signatures are immutable once built. Two signatures built with the same
/// configuration can be compared position by position; the fraction of
/// agreeing positions estimates the Jaccard similarity of the underlying
/// token sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u32>);

impl Signature {
    /// Wraps raw signature values.
    #[must_use]
    pub const fn new(values: Vec<u32>) -> Self {
        Self(values)
    }

    /// Returns the signature values.
    #[must_use]
    pub fn values(&self) -> &[u32] {
        &self.0
    }

    /// Consumes the signature, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<u32> {
        self.0
    }

    /// Returns the number of permutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the signature has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the signature of the union of both underlying token sets.
    ///
    /// This is the per-position minimum. Signatures of different lengths are
    /// combined over the shorter length.
    ///
    /// ```rust
    /// use simidx::Signature;
    ///
    /// let a = Signature::new(vec![3, 9, 4]);
    /// let b = Signature::new(vec![5, 2, 4]);
    /// assert_eq!(a.union(&b).values(), &[3, 2, 4]);
    /// ```
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (*a).min(*b))
                .collect(),
        )
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<Vec<u32>> for Signature {
    fn from(values: Vec<u32>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_positional_minimum() {
        let a = Signature::new(vec![1, 8, 5, 0]);
        let b = Signature::new(vec![2, 3, 5, 9]);
        assert_eq!(a.union(&b), Signature::new(vec![1, 3, 5, 0]));
        assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn test_union_with_self_is_identity() {
        let a = Signature::new(vec![7, 1, 4]);
        assert_eq!(a.union(&a), a);
    }

    #[test]
    fn test_display() {
        assert_eq!(Signature::new(vec![1, 22, 333]).to_string(), "1,22,333");
        assert_eq!(Signature::new(vec![]).to_string(), "");
    }
}
