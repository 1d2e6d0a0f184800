//! MinHash signature builder.
//!
//! Each permutation is an `xxh3` hash seeded with the permutation's position,
//! reduced modulo the configured modulus. The signature value at a position is
//! the minimum hash over all tokens of the feature, so the probability that two
//! signatures agree at a position equals the Jaccard similarity of their token
//! sets.

use crate::models::{Feature, Signature};
use crate::{Error, Result};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Builds MinHash signatures from features.
///
/// The builder is pure and stateless beyond its configuration, so signatures
/// built by separate instances (or separate processes) with the same
/// `(permutations, modulus)` are directly comparable.
///
/// # Example
///
/// ```rust
/// use simidx::{Feature, MinHashSignatureBuilder};
///
/// let builder = MinHashSignatureBuilder::new(32, 0xFFFF)?;
/// let a = builder.build(&Feature::text("hello world")).unwrap();
/// let b = builder.build(&Feature::text("hello world")).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 32);
/// # Ok::<(), simidx::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinHashSignatureBuilder {
    permutations: usize,
    modulus: u32,
}

impl MinHashSignatureBuilder {
    /// Creates a builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `permutations` or `modulus` is zero.
    pub fn new(permutations: usize, modulus: u32) -> Result<Self> {
        if permutations == 0 {
            return Err(Error::Configuration(
                "permutation count must be positive".to_string(),
            ));
        }
        if modulus == 0 {
            return Err(Error::Configuration("modulus must be positive".to_string()));
        }
        Ok(Self {
            permutations,
            modulus,
        })
    }

    /// Returns the signature length.
    #[must_use]
    pub const fn permutations(&self) -> usize {
        self.permutations
    }

    /// Returns the hash modulus.
    #[must_use]
    pub const fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Builds the signature of a single feature.
    ///
    /// Returns `None` for a feature without tokens.
    #[must_use]
    pub fn build(&self, feature: &Feature) -> Option<Signature> {
        self.build_many(std::iter::once(feature))
    }

    /// Builds one signature for the union of several features' tokens.
    ///
    /// Returns `None` when no feature contributes a token.
    #[must_use]
    pub fn build_many<'a, I>(&self, features: I) -> Option<Signature>
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        let mut minimums = vec![u32::MAX; self.permutations];
        let mut seen = false;
        let mut buf = [0_u8; 4];

        for feature in features {
            match feature {
                Feature::Text(text) => {
                    for c in text.chars() {
                        self.absorb(&mut minimums, c.encode_utf8(&mut buf).as_bytes());
                        seen = true;
                    }
                },
                Feature::Tokens(tokens) => {
                    for token in tokens {
                        self.absorb(&mut minimums, token.as_bytes());
                        seen = true;
                    }
                },
            }
        }

        seen.then(|| Signature::new(minimums))
    }

    /// Folds one token into the running per-permutation minimums.
    fn absorb(&self, minimums: &mut [u32], token: &[u8]) {
        let modulus = u64::from(self.modulus);
        for (column, slot) in minimums.iter_mut().enumerate() {
            // Bounded by the modulus, which is itself a u32.
            #[allow(clippy::cast_possible_truncation)]
            let value = (xxh3_64_with_seed(token, column as u64) % modulus) as u32;
            if value < *slot {
                *slot = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::compare_signatures;

    fn builder() -> MinHashSignatureBuilder {
        MinHashSignatureBuilder::new(32, 0xFFFF).unwrap()
    }

    #[test]
    fn test_rejects_zero_permutations() {
        assert!(matches!(
            MinHashSignatureBuilder::new(0, 0xFFFF),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_zero_modulus() {
        assert!(matches!(
            MinHashSignatureBuilder::new(32, 0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_signature_length_matches_permutations() {
        let builder = MinHashSignatureBuilder::new(48, 1000).unwrap();
        let signature = builder.build(&Feature::text("abc")).unwrap();
        assert_eq!(signature.len(), 48);
        assert!(signature.values().iter().all(|v| *v < 1000));
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = builder().build(&Feature::text("hello world"));
        let b = MinHashSignatureBuilder::new(32, 0xFFFF)
            .unwrap()
            .build(&Feature::text("hello world"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_feature_has_no_signature() {
        assert_eq!(builder().build(&Feature::text("")), None);
        assert_eq!(builder().build(&Feature::tokens(Vec::<String>::new())), None);
        assert_eq!(builder().build_many(std::iter::empty()), None);
    }

    #[test]
    fn test_token_order_and_repetition_do_not_matter() {
        let a = builder().build(&Feature::tokens(["foo", "bar"]));
        let b = builder().build(&Feature::tokens(["bar", "foo", "bar"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_text_matches_its_character_tokens() {
        let text = builder().build(&Feature::text("hello"));
        let chars = builder().build(&Feature::tokens(["h", "e", "l", "o"]));
        assert_eq!(text, chars);
    }

    #[test]
    fn test_build_many_is_union_of_signatures() {
        let builder = builder();
        let a = Feature::tokens(["foo", "bar"]);
        let b = Feature::tokens(["baz"]);

        let combined = builder.build_many([&a, &b]).unwrap();
        let union = builder
            .build(&a)
            .unwrap()
            .union(&builder.build(&b).unwrap());
        assert_eq!(combined, union);
    }

    #[test]
    fn test_disjoint_sets_rarely_agree() {
        let builder = MinHashSignatureBuilder::new(128, u32::MAX).unwrap();
        let a = builder.build(&Feature::tokens(["alpha", "beta"])).unwrap();
        let b = builder.build(&Feature::tokens(["gamma", "delta"])).unwrap();
        assert!(compare_signatures(&a, &b) < 0.1);
    }

    #[test]
    fn test_estimate_tracks_jaccard() {
        // |A ∩ B| = 50, |A ∪ B| = 150
        let builder = MinHashSignatureBuilder::new(256, u32::MAX).unwrap();
        let a: Vec<String> = (0..100).map(|i| format!("t{i}")).collect();
        let b: Vec<String> = (50..150).map(|i| format!("t{i}")).collect();
        let sa = builder.build(&Feature::Tokens(a)).unwrap();
        let sb = builder.build(&Feature::Tokens(b)).unwrap();
        let estimate = compare_signatures(&sa, &sb);
        assert!((estimate - 1.0 / 3.0).abs() < 0.15, "estimate {estimate}");
    }
}
