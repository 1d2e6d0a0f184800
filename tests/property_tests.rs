//! Property-based tests for signatures and blobs.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Signature building is deterministic across builder instances
//! - A signature compares to itself as exactly 1.0
//! - Union is the signature of the combined token sets
//! - Export blobs decode to what was encoded, and junk never panics

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use proptest::prelude::*;
use simidx::similarity::{ExportedSignature, decode_export, encode_export};
use simidx::storage::{ManualClock, MemoryStore};
use simidx::{Feature, IndexConfig, MinHashIndex, MinHashSignatureBuilder, Signature, compare_signatures};
use std::sync::Arc;

fn builder() -> MinHashSignatureBuilder {
    MinHashSignatureBuilder::new(32, 0xFFFF).unwrap()
}

fn token_bag() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 1..20)
}

proptest! {
    /// Property: separate builders yield identical signatures.
    #[test]
    fn prop_build_is_deterministic(text in ".{1,64}") {
        let a = builder().build(&Feature::text(text.as_str()));
        let b = builder().build(&Feature::text(text.as_str()));
        prop_assert!(a.is_some());
        prop_assert_eq!(a, b);
    }

    /// Property: token order and repetition do not matter.
    #[test]
    fn prop_build_ignores_token_order(mut tokens in token_bag()) {
        let forward = builder().build(&Feature::tokens(tokens.clone())).unwrap();
        tokens.reverse();
        tokens.extend(tokens.clone());
        let shuffled = builder().build(&Feature::tokens(tokens)).unwrap();
        prop_assert_eq!(forward, shuffled);
    }

    /// Property: every signature value lies below the modulus.
    #[test]
    fn prop_values_below_modulus(tokens in token_bag(), modulus in 1u32..1000) {
        let builder = MinHashSignatureBuilder::new(16, modulus).unwrap();
        let signature = builder.build(&Feature::tokens(tokens)).unwrap();
        prop_assert_eq!(signature.len(), 16);
        prop_assert!(signature.values().iter().all(|v| *v < modulus));
    }

    /// Property: a signature is fully similar to itself.
    #[test]
    fn prop_self_comparison_is_one(tokens in token_bag()) {
        let signature = builder().build(&Feature::tokens(tokens)).unwrap();
        prop_assert_eq!(compare_signatures(&signature, &signature), 1.0);
    }

    /// Property: similarity is symmetric and within [0, 1].
    #[test]
    fn prop_comparison_symmetric(a in token_bag(), b in token_bag()) {
        let a = builder().build(&Feature::tokens(a)).unwrap();
        let b = builder().build(&Feature::tokens(b)).unwrap();
        let score = compare_signatures(&a, &b);
        prop_assert_eq!(score, compare_signatures(&b, &a));
        prop_assert!((0.0..=1.0).contains(&score));
    }

    /// Property: the union of two signatures is the signature of both token sets.
    #[test]
    fn prop_union_matches_combined_tokens(a in token_bag(), b in token_bag()) {
        let builder = builder();
        let sa = builder.build(&Feature::tokens(a.clone())).unwrap();
        let sb = builder.build(&Feature::tokens(b.clone())).unwrap();
        let combined = builder
            .build_many([&Feature::tokens(a), &Feature::tokens(b)])
            .unwrap();
        prop_assert_eq!(sa.union(&sb), combined);
    }

    /// Property: union is idempotent, commutative, and never raises a value.
    #[test]
    fn prop_union_laws(a in prop::collection::vec(any::<u32>(), 8), b in prop::collection::vec(any::<u32>(), 8)) {
        let a = Signature::new(a);
        let b = Signature::new(b);
        prop_assert_eq!(a.union(&a), a.clone());
        prop_assert_eq!(a.union(&b), b.union(&a));
        let merged = a.union(&b);
        for (m, (x, y)) in merged.values().iter().zip(a.values().iter().zip(b.values())) {
            prop_assert!(m <= x && m <= y);
        }
    }

    /// Property: export blobs decode to exactly what was encoded.
    #[test]
    fn prop_export_blob_roundtrip(
        values in prop::option::of(prop::collection::vec(any::<u32>(), 0..64)),
        ttl in any::<i64>(),
    ) {
        let exported = ExportedSignature {
            signature: values.map(Signature::new),
            ttl,
        };
        prop_assert_eq!(decode_export(&encode_export(&exported)).unwrap(), exported);
    }

    /// Property: decoding arbitrary bytes returns an error or a value, never panics.
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let _ = decode_export(&bytes);
    }

    /// Property: merging a key into itself leaves the record untouched.
    #[test]
    fn prop_self_merge_is_noop(tokens in token_bag()) {
        let store = MemoryStore::with_clock(Arc::new(ManualClock::new(1_700_000_000)));
        let index = MinHashIndex::new(IndexConfig::default(), store).unwrap();
        index.record("ns", "1", &[("label", Feature::tokens(tokens))]).unwrap();
        let before = index.lookup("ns", "label", "1").unwrap();

        index.merge("ns", "1", &[("label", "1")]).unwrap();
        prop_assert_eq!(index.lookup("ns", "label", "1").unwrap(), before);
    }
}
