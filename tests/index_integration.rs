//! Index integration tests.
//!
//! End-to-end scenarios over the in-memory store:
//! - Basic recall and exact-threshold matching
//! - Multi-label scoring, including `None` versus `0.0` components
//! - Merge, deletion, and flush scoping
//! - Export/import between keys and across index instances
//!
//! Assertions avoid depending on the exact estimate for partially similar
//! items; those only need to rank below identical ones.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use simidx::storage::{Clock, ManualClock, MemoryStore};
use simidx::{ALL_NAMESPACES, Error, Feature, IndexConfig, MinHashIndex, SimilarityMatch};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000;
const BANDS: usize = 16;

fn index_at(clock: &Arc<ManualClock>) -> MinHashIndex<MemoryStore> {
    MinHashIndex::new(IndexConfig::default(), MemoryStore::with_clock(clock.clone())).unwrap()
}

fn index() -> MinHashIndex<MemoryStore> {
    index_at(&Arc::new(ManualClock::new(NOW)))
}

fn keys(results: &[SimilarityMatch]) -> Vec<&str> {
    results.iter().map(|m| m.key.as_str()).collect()
}

fn text(s: &str) -> Feature {
    Feature::text(s)
}

/// Records the five-item corpus: "1" and "2" identical, "3" and "4" close,
/// "5" further away.
fn record_corpus(index: &MinHashIndex<MemoryStore>) {
    index.record("example", "1", &[("index", text("hello world"))]).unwrap();
    index.record("example", "2", &[("index", text("hello world"))]).unwrap();
    index.record("example", "3", &[("index", text("jello world"))]).unwrap();
    index
        .record(
            "example",
            "4",
            &[("index", text("yellow world")), ("index", text("mellow world"))],
        )
        .unwrap();
    index.record("example", "5", &[("index", text("pizza world"))]).unwrap();
}

fn assert_identical_first(results: &[SimilarityMatch]) {
    assert!(results.len() >= 2, "expected at least two results: {results:?}");
    assert_eq!(results[0], SimilarityMatch::new("1", vec![Some(1.0)]));
    assert_eq!(results[1], SimilarityMatch::new("2", vec![Some(1.0)]));
    for result in &results[2..] {
        let score = result.scores[0].unwrap();
        assert!(score < 1.0, "{} scored {score}", result.key);
    }
}

// ============================================================================
// Recall
// ============================================================================

#[test]
fn test_compare_without_threshold() {
    let index = index();
    record_corpus(&index);

    let results = index.compare("example", "1", &[("index", 0)], None).unwrap();
    assert_identical_first(&results);
    assert_eq!(keys(&results), vec!["1", "2", "3", "4", "5"]);
    let scores: Vec<f64> = results.iter().map(|m| m.scores[0].unwrap()).collect();
    assert!(scores[2] > scores[3] && scores[3] > scores[4], "{scores:?}");
}

#[test]
fn test_low_threshold_keeps_every_near_match() {
    let index = index();
    record_corpus(&index);
    let unfiltered = index.compare("example", "1", &[("index", 0)], None).unwrap();

    for threshold in [1, 6] {
        let compared = index
            .compare("example", "1", &[("index", threshold)], None)
            .unwrap();
        assert_eq!(compared, unfiltered, "threshold {threshold}");

        let classified = index
            .classify("example", &[("index", threshold, text("hello world"))], None)
            .unwrap();
        assert_eq!(classified, unfiltered, "threshold {threshold}");
    }
}

#[test]
fn test_classify_matches_compare_for_same_feature() {
    let index = index();
    record_corpus(&index);

    let compared = index.compare("example", "1", &[("index", 0)], None).unwrap();
    let classified = index
        .classify("example", &[("index", 0, text("hello world"))], None)
        .unwrap();
    assert_eq!(compared, classified);
}

#[test]
fn test_full_threshold_returns_exact_matches_only() {
    let index = index();
    record_corpus(&index);

    let results = index.compare("example", "1", &[("index", BANDS)], None).unwrap();
    assert_eq!(keys(&results), vec!["1", "2"]);

    let results = index
        .classify("example", &[("index", BANDS, text("hello world"))], None)
        .unwrap();
    assert_eq!(keys(&results), vec!["1", "2"]);
}

#[test]
fn test_limit_keeps_lexicographic_winner() {
    let index = index();
    record_corpus(&index);

    let results = index.compare("example", "1", &[("index", 0)], Some(1)).unwrap();
    assert_eq!(results, vec![SimilarityMatch::new("1", vec![Some(1.0)])]);

    let results = index
        .classify("example", &[("index", 0, text("hello world"))], Some(1))
        .unwrap();
    assert_eq!(results, vec![SimilarityMatch::new("1", vec![Some(1.0)])]);
}

#[test]
fn test_compare_unknown_key_is_empty() {
    let index = index();
    record_corpus(&index);
    assert!(index.compare("example", "missing", &[("index", 0)], None).unwrap().is_empty());
    assert!(index.compare("other", "1", &[("index", 0)], None).unwrap().is_empty());
}

// ============================================================================
// Multiple Labels
// ============================================================================

fn record_two_label_corpus(index: &MinHashIndex<MemoryStore>) {
    let both = |a: &str, b: &str| [("index:a", text(a)), ("index:b", text(b))];
    index.record("example", "1", &both("hello world", "hello world")).unwrap();
    index.record("example", "2", &both("hello world", "hello world")).unwrap();
    index.record("example", "3", &both("hello world", "pizza world")).unwrap();
    index.record("example", "4", &[("index:a", text("hello world"))]).unwrap();
    index.record("example", "5", &[("index:b", text("hello world"))]).unwrap();
}

#[test]
fn test_multi_label_compare() {
    let index = index();
    record_two_label_corpus(&index);

    let results = index
        .compare("example", "1", &[("index:a", 0), ("index:b", 0)], None)
        .unwrap();
    assert_eq!(keys(&results), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(results[0].scores, vec![Some(1.0), Some(1.0)]);
    assert_eq!(results[1].scores, vec![Some(1.0), Some(1.0)]);
    assert_eq!(results[2].scores[0], Some(1.0));
    assert_eq!(results[3].scores, vec![Some(1.0), Some(0.0)]);
    assert_eq!(results[4].scores, vec![Some(0.0), Some(1.0)]);
}

#[test]
fn test_multi_label_limit() {
    let index = index();
    record_two_label_corpus(&index);

    let results = index
        .classify(
            "example",
            &[("index:a", 0, text("hello world")), ("index:b", 0, text("hello world"))],
            Some(4),
        )
        .unwrap();
    assert_eq!(keys(&results), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_candidate_from_one_label_scored_on_all() {
    let index = index();
    record_two_label_corpus(&index);

    // Only "1", "2" and "5" hold the query's every `index:b` band; `index:a`
    // contributes no candidates, yet is still scored.
    let results = index
        .classify(
            "example",
            &[("index:a", BANDS, text("pizza world")), ("index:b", BANDS, text("hello world"))],
            None,
        )
        .unwrap();
    assert_eq!(keys(&results), vec!["1", "2", "5"]);
    assert_eq!(results[2].scores, vec![Some(0.0), Some(1.0)]);
    for result in &results[..2] {
        assert!(result.scores[0].unwrap() > 0.0);
        assert_eq!(result.scores[1], Some(1.0));
    }
}

#[test]
fn test_empty_query_feature_scores_none_against_absent_label() {
    let index = index();
    record_two_label_corpus(&index);

    let expected = vec![
        SimilarityMatch::new("4", vec![Some(1.0), None]),
        SimilarityMatch::new("1", vec![Some(1.0), Some(0.0)]),
        SimilarityMatch::new("2", vec![Some(1.0), Some(0.0)]),
        SimilarityMatch::new("3", vec![Some(1.0), Some(0.0)]),
    ];

    let classified = index
        .classify(
            "example",
            &[("index:a", 0, text("hello world")), ("index:b", 0, text(""))],
            None,
        )
        .unwrap();
    assert_eq!(classified, expected);

    let compared = index
        .compare("example", "4", &[("index:a", 0), ("index:b", 0)], None)
        .unwrap();
    assert_eq!(compared, expected);
}

// ============================================================================
// Merge and Delete
// ============================================================================

#[test]
fn test_merge_dilutes_similarity() {
    let index = index();
    index.record("example", "1", &[("index", Feature::tokens(["foo", "bar"]))]).unwrap();
    index.record("example", "2", &[("index", Feature::tokens(["baz"]))]).unwrap();

    let query = [("index", 0, Feature::tokens(["foo", "bar"]))];
    let results = index.classify("example", &query, None).unwrap();
    assert_eq!(results, vec![SimilarityMatch::new("1", vec![Some(1.0)])]);

    index.merge("example", "1", &[("index", "2")]).unwrap();
    let results = index.classify("example", &query, None).unwrap();
    assert_eq!(keys(&results), vec!["1"]);
    let score = results[0].scores[0].unwrap();
    assert!(score > 0.0 && score < 1.0, "merged score {score}");

    // The merged signature is the one built from the union of both token sets.
    let union = index
        .builder()
        .build(&Feature::tokens(["foo", "bar", "baz"]))
        .unwrap();
    assert_eq!(index.signature("example", "index", "1").unwrap(), union);
}

#[test]
fn test_merge_into_empty_key_copies_source() {
    let index = index();
    index.record("example", "1", &[("index", Feature::tokens(["foo", "bar"]))]).unwrap();
    index.merge("example", "2", &[("index", "1")]).unwrap();

    let results = index
        .classify("example", &[("index", 0, Feature::tokens(["foo", "bar"]))], None)
        .unwrap();
    assert_eq!(keys(&results), vec!["1", "2"]);
    assert!(results.iter().all(|m| m.scores == vec![Some(1.0)]));
}

#[test]
fn test_self_merge_is_noop() {
    let index = index();
    record_corpus(&index);
    let before = index.lookup("example", "index", "3").unwrap().unwrap();

    index.merge("example", "3", &[("index", "3")]).unwrap();
    assert_eq!(index.lookup("example", "index", "3").unwrap().unwrap(), before);
}

#[test]
fn test_delete_removes_recall() {
    let index = index();
    record_corpus(&index);
    let before = index.compare("example", "1", &[("index", 0)], None).unwrap();

    index.delete("example", &[("index", "3")]).unwrap();
    let after = index.compare("example", "1", &[("index", 0)], None).unwrap();

    let expected: Vec<SimilarityMatch> = before.into_iter().filter(|m| m.key != "3").collect();
    assert_eq!(after, expected);
    assert_eq!(index.store().membership_count("3"), 0);
}

// ============================================================================
// Flush
// ============================================================================

#[test]
fn test_flush_scoped_to_namespace() {
    let index = index();
    let feature = || [("index", Feature::tokens(["foo", "bar"]))];
    index.record("example", "1", &feature()).unwrap();
    index.record("other", "1", &feature()).unwrap();
    let query = [("index", 0, Feature::tokens(["foo", "bar"]))];

    index.flush("example", &["index"]).unwrap();
    assert!(index.classify("example", &query, None).unwrap().is_empty());
    assert_eq!(keys(&index.classify("other", &query, None).unwrap()), vec!["1"]);
}

#[test]
fn test_flush_scoped_to_label() {
    let index = index();
    index
        .record(
            "example",
            "1",
            &[("a", Feature::tokens(["foo"])), ("b", Feature::tokens(["foo"]))],
        )
        .unwrap();

    index.flush("example", &["a"]).unwrap();
    let results = index.compare("example", "1", &[("b", 0)], None).unwrap();
    assert_eq!(results, vec![SimilarityMatch::new("1", vec![Some(1.0)])]);
    assert!(index.compare("example", "1", &[("a", 0)], None).unwrap().is_empty());
}

#[test]
fn test_flush_counts_only_live_keys() {
    let clock = Arc::new(ManualClock::new(NOW));
    let index = index_at(&clock);
    for i in 0..100 {
        let feature = Feature::tokens([format!("token-{i}")]);
        index.record("example", &i.to_string(), &[("index", feature)]).unwrap();
    }

    clock.advance(IndexConfig::default().ttl_secs + 1);
    index.record("example", "fresh", &[("index", Feature::tokens(["foo", "bar"]))]).unwrap();
    assert_eq!(index.store().record_count(), 1);

    let removed = index.flush("example", &["index"]).unwrap();
    assert_eq!(removed, 1 + BANDS);
}

#[test]
fn test_flush_all_namespaces() {
    let index = index();
    for ns in ["example", "other"] {
        index.record(ns, "1", &[("index", Feature::tokens(["foo", "bar"]))]).unwrap();
    }
    let removed = index.flush(ALL_NAMESPACES, &["index"]).unwrap();

    // One record plus every bucket, per namespace.
    assert_eq!(removed, 2 * (1 + BANDS));
    assert_eq!(index.store().record_count(), 0);
    assert_eq!(index.store().bucket_count(), 0);
}

// ============================================================================
// Export and Import
// ============================================================================

#[test]
fn test_export_import_copies_between_keys() {
    let clock = Arc::new(ManualClock::new(NOW));
    let index = index_at(&clock);
    index.record("example", "1", &[("index", text("hello world"))]).unwrap();

    clock.advance(90);
    let timestamp = clock.now();
    let blobs = index.export("example", &[("index", "1")], timestamp).unwrap();
    assert_eq!(blobs.len(), 1);
    index
        .import("example", &[("index", "2", blobs[0].as_slice())], timestamp)
        .unwrap();

    let original = index.lookup("example", "index", "1").unwrap().unwrap();
    let copy = index.lookup("example", "index", "2").unwrap().unwrap();
    assert_eq!(copy.signature, original.signature);
    assert_eq!(copy.remaining_ttl(timestamp), original.remaining_ttl(timestamp));

    let results = index.compare("example", "2", &[("index", 0)], None).unwrap();
    assert_eq!(keys(&results), vec!["1", "2"]);
    assert!(results.iter().all(|m| m.scores == vec![Some(1.0)]));
}

#[test]
fn test_import_twice_keeps_one_record() {
    let index = index();
    index.record("example", "1", &[("index", text("hello world"))]).unwrap();
    let blobs = index.export("example", &[("index", "1")], NOW).unwrap();
    let entries = [("index", "2", blobs[0].as_slice())];

    index.import("example", &entries, NOW).unwrap();
    index.import("example", &entries, NOW).unwrap();

    assert_eq!(index.store().record_count(), 2);
    assert_eq!(index.store().membership_count("2"), BANDS);
    let blobs = index.export("example", &[("index", "2")], NOW).unwrap();
    assert_eq!(blobs.len(), 1);
}

#[test]
fn test_import_into_fresh_index() {
    let source = index();
    record_corpus(&source);
    let entries = [("index", "1"), ("index", "3"), ("index", "missing")];
    let blobs = source.export("example", &entries, NOW).unwrap();

    let target = index();
    let imports: Vec<(&str, &str, &[u8])> = entries
        .iter()
        .zip(&blobs)
        .map(|((label, key), blob)| (*label, *key, blob.as_slice()))
        .collect();
    target.import("example", &imports, NOW).unwrap();

    assert_eq!(target.store().record_count(), 2);
    assert_eq!(
        target.signature("example", "index", "3").unwrap(),
        source.signature("example", "index", "3").unwrap()
    );
    assert!(matches!(
        target.signature("example", "index", "missing"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_imported_record_expires_with_original() {
    let clock = Arc::new(ManualClock::new(NOW));
    let index = index_at(&clock);
    index.record("example", "1", &[("index", text("hello world"))]).unwrap();
    let blobs = index.export("example", &[("index", "1")], NOW).unwrap();
    index
        .import("example", &[("index", "2", blobs[0].as_slice())], NOW)
        .unwrap();

    clock.advance(IndexConfig::default().ttl_secs);
    assert!(index.lookup("example", "index", "1").unwrap().is_none());
    assert!(index.lookup("example", "index", "2").unwrap().is_none());
    assert!(index.compare("example", "2", &[("index", 0)], None).unwrap().is_empty());
}
