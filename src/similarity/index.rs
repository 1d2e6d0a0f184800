//! The MinHash LSH index.
//!
//! Every write reads the affected records, plans the new state, and commits
//! a [`WriteBatch`] guarded by the versions it read. A batch carries the
//! record puts or removals together with the bucket membership changes they
//! imply, so a record and its memberships always move together.
//!
//! # Candidate Selection
//!
//! For each queried label the query signature's band keys name one bucket
//! per band. A member is a candidate for that label once it appears in at
//! least `max(threshold, 1)` of those buckets. Candidates are unioned across
//! labels and then scored on every requested label.

use super::banding::Banding;
use super::builder::MinHashSignatureBuilder;
use super::codec::{self, ExportedSignature};
use super::scoring::{component_score, rank};
use crate::config::IndexConfig;
use crate::models::{Feature, Signature, SignatureRecord, SimilarityMatch};
use crate::storage::{KeySpace, SignatureStore, WriteBatch, WriteOp};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Namespace argument to [`MinHashIndex::flush`] that spans every namespace.
pub const ALL_NAMESPACES: &str = "*";

/// Planned state of one record.
enum Change {
    Keep,
    Set { signature: Signature, expires_at: u64 },
    Remove,
}

/// One record touched by a write, with its state before and after the plan.
struct Slot<'a> {
    label: &'a str,
    item: &'a str,
    key: String,
    original: Option<SignatureRecord>,
    next: Option<(Signature, u64)>,
    touched: bool,
}

/// MinHash similarity index over a [`SignatureStore`].
///
/// The index holds no mutable state of its own; share it via `Arc` when the
/// store is `Send + Sync`.
pub struct MinHashIndex<S: SignatureStore> {
    config: IndexConfig,
    builder: MinHashSignatureBuilder,
    banding: Banding,
    keys: KeySpace,
    store: S,
}

impl<S: SignatureStore> MinHashIndex<S> {
    /// Creates an index over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the parameters are invalid.
    pub fn new(config: IndexConfig, store: S) -> Result<Self> {
        config.validate()?;
        let builder = MinHashSignatureBuilder::new(config.permutations, config.modulus)?;
        let banding = Banding::new(config.permutations, config.bands)?;
        let keys = KeySpace::new(config.prefix.clone());
        Ok(Self {
            config,
            builder,
            banding,
            keys,
            store,
        })
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Returns the signature builder.
    pub const fn builder(&self) -> &MinHashSignatureBuilder {
        &self.builder
    }

    /// Returns the key layout.
    pub const fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Records features for an item.
    ///
    /// Features sharing a label are unioned into one signature; absent (empty)
    /// features are skipped. Each recorded label replaces the previous
    /// signature and refreshes its TTL.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`Error::Conflict`] when concurrent
    /// writers exhaust the retry budget.
    #[instrument(skip_all, fields(namespace = %namespace, key = %key, features = features.len()))]
    pub fn record(&self, namespace: &str, key: &str, features: &[(&str, Feature)]) -> Result<()> {
        count_operation("record");

        let mut grouped: BTreeMap<&str, Vec<&Feature>> = BTreeMap::new();
        for (label, feature) in features {
            grouped.entry(*label).or_default().push(feature);
        }
        let signatures: Vec<(&str, Signature)> = grouped
            .into_iter()
            .filter_map(|(label, group)| self.builder.build_many(group).map(|s| (label, s)))
            .collect();
        if signatures.is_empty() {
            tracing::debug!("No non-empty features to record");
            return Ok(());
        }

        let targets: Vec<(&str, &str)> = signatures.iter().map(|(label, _)| (*label, key)).collect();
        let ttl = self.config.ttl_secs;
        self.write("record", namespace, &targets, &[], |i, _, _, now| Change::Set {
            signature: signatures[i].1.clone(),
            expires_at: now.saturating_add(ttl),
        })
    }

    /// Finds items similar to a recorded item.
    ///
    /// `labels` pairs each label with its band-hit threshold. The query item
    /// itself is part of the result when recorded.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip_all, fields(namespace = %namespace, key = %key, labels = labels.len()))]
    pub fn compare(
        &self,
        namespace: &str,
        key: &str,
        labels: &[(&str, usize)],
        limit: Option<usize>,
    ) -> Result<Vec<SimilarityMatch>> {
        count_operation("compare");
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let record_keys: Vec<String> = labels
            .iter()
            .map(|(label, _)| self.keys.record_key(namespace, label, key))
            .collect();
        let records = self.store.load_many(&record_keys)?;
        let queries: Vec<(&str, usize, Option<Signature>)> = labels
            .iter()
            .zip(records)
            .map(|(&(label, threshold), record)| (label, threshold, record.map(|r| r.signature)))
            .collect();
        self.search("compare", namespace, &queries, limit)
    }

    /// Finds items similar to the given features without recording them.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip_all, fields(namespace = %namespace, labels = queries.len()))]
    pub fn classify(
        &self,
        namespace: &str,
        queries: &[(&str, usize, Feature)],
        limit: Option<usize>,
    ) -> Result<Vec<SimilarityMatch>> {
        count_operation("classify");
        let queries: Vec<(&str, usize, Option<Signature>)> = queries
            .iter()
            .map(|(label, threshold, feature)| (*label, *threshold, self.builder.build(feature)))
            .collect();
        self.search("classify", namespace, &queries, limit)
    }

    /// Merges source items into `destination`, label by label.
    ///
    /// The destination becomes the union of itself and the source; an absent
    /// destination becomes a copy. Absent sources and self-merges change
    /// nothing. Sources are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`Error::Conflict`] when retries run out.
    #[instrument(skip_all, fields(namespace = %namespace, destination = %destination, sources = sources.len()))]
    pub fn merge(&self, namespace: &str, destination: &str, sources: &[(&str, &str)]) -> Result<()> {
        count_operation("merge");

        let sources: Vec<(&str, &str)> = sources
            .iter()
            .filter(|(_, source)| *source != destination)
            .copied()
            .collect();
        if sources.is_empty() {
            return Ok(());
        }

        let source_keys: Vec<String> = sources
            .iter()
            .map(|(label, source)| self.keys.record_key(namespace, label, source))
            .collect();

        let targets: Vec<(&str, &str)> = sources.iter().map(|(label, _)| (*label, destination)).collect();
        let ttl = self.config.ttl_secs;
        self.write("merge", namespace, &targets, &source_keys, |i, current, loaded, now| {
            let Some(source) = &loaded[i] else {
                return Change::Keep;
            };
            let signature = current.map_or_else(
                || source.signature.clone(),
                |existing| existing.union(&source.signature),
            );
            Change::Set {
                signature,
                expires_at: now.saturating_add(ttl),
            }
        })
    }

    /// Deletes `(label, key)` records and their bucket memberships.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`Error::Conflict`] when retries run out.
    #[instrument(skip_all, fields(namespace = %namespace, entries = entries.len()))]
    pub fn delete(&self, namespace: &str, entries: &[(&str, &str)]) -> Result<()> {
        count_operation("delete");
        self.write("delete", namespace, entries, &[], |_, _, _, _| Change::Remove)
    }

    /// Exports `(label, key)` records as portable blobs.
    ///
    /// Each blob carries the TTL remaining at `timestamp`. Absent records
    /// export as a blob without a signature.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip_all, fields(namespace = %namespace, entries = entries.len()))]
    pub fn export(
        &self,
        namespace: &str,
        entries: &[(&str, &str)],
        timestamp: u64,
    ) -> Result<Vec<Vec<u8>>> {
        count_operation("export");
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let record_keys: Vec<String> = entries
            .iter()
            .map(|(label, key)| self.keys.record_key(namespace, label, key))
            .collect();
        let records = self.store.load_many(&record_keys)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let exported = record.map_or(
                    ExportedSignature {
                        signature: None,
                        ttl: 0,
                    },
                    |r| ExportedSignature {
                        ttl: r.remaining_ttl(timestamp),
                        signature: Some(r.signature),
                    },
                );
                codec::encode_export(&exported)
            })
            .collect())
    }

    /// Imports blobs produced by [`MinHashIndex::export`].
    ///
    /// Every blob is decoded before anything is written. Empty blobs, blobs
    /// without a signature, and blobs whose TTL ran out are skipped. The rest
    /// are stored with `expires_at = timestamp + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for a malformed blob or a signature
    /// whose length does not match this index, leaving storage untouched.
    #[instrument(skip_all, fields(namespace = %namespace, entries = entries.len()))]
    pub fn import(&self, namespace: &str, entries: &[(&str, &str, &[u8])], timestamp: u64) -> Result<()> {
        count_operation("import");

        let mut decoded: Vec<(&str, &str, Signature, u64)> = Vec::with_capacity(entries.len());
        for &(label, key, blob) in entries {
            if blob.is_empty() {
                continue;
            }
            let exported = codec::decode_export(blob)?;
            let Some(signature) = exported.signature else {
                continue;
            };
            if signature.len() != self.config.permutations {
                return Err(Error::Serialization(format!(
                    "signature for '{key}' has {} values, index expects {}",
                    signature.len(),
                    self.config.permutations
                )));
            }
            if exported.ttl <= 0 {
                continue;
            }
            let expires_at = timestamp.saturating_add(exported.ttl.unsigned_abs());
            decoded.push((label, key, signature, expires_at));
        }
        tracing::debug!(accepted = decoded.len(), "Decoded import blobs");

        let targets: Vec<(&str, &str)> = decoded.iter().map(|(label, key, _, _)| (*label, *key)).collect();
        self.write("import", namespace, &targets, &[], |i, _, _, now| {
            let (_, _, signature, expires_at) = &decoded[i];
            if *expires_at <= now {
                return Change::Keep;
            }
            Change::Set {
                signature: signature.clone(),
                expires_at: *expires_at,
            }
        })
    }

    /// Deletes every record and bucket of the given labels.
    ///
    /// `namespace` may be [`ALL_NAMESPACES`]. Returns the number of store keys removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip_all, fields(namespace = %namespace, labels = labels.len()))]
    pub fn flush(&self, namespace: &str, labels: &[&str]) -> Result<usize> {
        count_operation("flush");
        let scope = (namespace != ALL_NAMESPACES).then_some(namespace);
        let mut removed = 0;
        for label in labels {
            removed += self
                .store
                .delete_matching(&self.keys.label_scope(scope, label))?;
        }
        tracing::info!(removed, "Flushed labels");
        Ok(removed)
    }

    /// Loads the live record for `(label, key)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn lookup(&self, namespace: &str, label: &str, key: &str) -> Result<Option<SignatureRecord>> {
        self.store
            .load(&self.keys.record_key(namespace, label, key))
    }

    /// Returns the stored signature for `(label, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no live record exists.
    pub fn signature(&self, namespace: &str, label: &str, key: &str) -> Result<Signature> {
        self.lookup(namespace, label, key)?
            .map(|record| record.signature)
            .ok_or_else(|| Error::NotFound {
                label: label.to_string(),
                key: key.to_string(),
            })
    }

    fn bucket_keys(&self, namespace: &str, label: &str, signature: &Signature) -> Vec<String> {
        self.banding
            .band_keys(signature)
            .iter()
            .enumerate()
            .map(|(band, band_key)| self.keys.bucket_key(namespace, label, band, band_key))
            .collect()
    }

    fn search(
        &self,
        operation: &'static str,
        namespace: &str,
        queries: &[(&str, usize, Option<Signature>)],
        limit: Option<usize>,
    ) -> Result<Vec<SimilarityMatch>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let mut buckets = Vec::new();
        let mut owners = Vec::new();
        for (query, (label, _, signature)) in queries.iter().enumerate() {
            if let Some(signature) = signature {
                for bucket in self.bucket_keys(namespace, label, signature) {
                    buckets.push(bucket);
                    owners.push(query);
                }
            }
        }
        let members = if buckets.is_empty() {
            Vec::new()
        } else {
            self.store.members(&buckets)?
        };

        let mut hits: Vec<HashMap<&str, usize>> = vec![HashMap::new(); queries.len()];
        for (owner, list) in owners.iter().zip(&members) {
            for member in list {
                *hits[*owner].entry(member.as_str()).or_default() += 1;
            }
        }

        let mut candidates: BTreeMap<&str, usize> = BTreeMap::new();
        for ((_, threshold, _), label_hits) in queries.iter().zip(&hits) {
            let required = (*threshold).max(1);
            for (member, count) in label_hits {
                if *count >= required {
                    *candidates.entry(*member).or_default() += count;
                }
            }
        }

        let mut candidates: Vec<(&str, usize)> = candidates.into_iter().collect();
        if let Some(cap) = self.config.candidate_limit {
            if candidates.len() > cap {
                candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                candidates.truncate(cap);
            }
        }
        tracing::debug!(
            buckets = buckets.len(),
            candidates = candidates.len(),
            "Selected candidates"
        );
        metrics::counter!("simidx_candidates_total", "operation" => operation)
            .increment(candidates.len() as u64);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let record_keys: Vec<String> = candidates
            .iter()
            .flat_map(|(member, _)| {
                queries
                    .iter()
                    .map(move |(label, _, _)| self.keys.record_key(namespace, label, member))
            })
            .collect();
        let records = self.store.load_many(&record_keys)?;

        let mut matches: Vec<SimilarityMatch> = candidates
            .iter()
            .zip(records.chunks(queries.len()))
            .map(|((member, _), candidate_records)| {
                let scores = queries
                    .iter()
                    .zip(candidate_records)
                    .map(|((_, _, query), record)| {
                        component_score(query.as_ref(), record.as_ref().map(|r| &r.signature))
                    })
                    .collect();
                SimilarityMatch::new(*member, scores)
            })
            .collect();
        rank(&mut matches, limit);
        Ok(matches)
    }

    /// Runs an optimistic write over `(label, item)` targets.
    ///
    /// `plan` is called once per target per attempt, in target order, with
    /// the target's signature as already planned by earlier targets.
    ///
    /// `guards` are record keys the plan reads but never writes. They are
    /// reloaded on every attempt and handed to `plan`, and the commit fails
    /// if any of them changed in between.
    fn write<F>(
        &self,
        operation: &'static str,
        namespace: &str,
        targets: &[(&str, &str)],
        guards: &[String],
        mut plan: F,
    ) -> Result<()>
    where
        F: FnMut(usize, Option<&Signature>, &[Option<SignatureRecord>], u64) -> Change,
    {
        if targets.is_empty() {
            return Ok(());
        }

        let attempts = self.config.max_write_attempts;
        for attempt in 1..=attempts {
            let now = self.store.now();

            let mut slots: Vec<Slot<'_>> = Vec::new();
            let mut slot_of: HashMap<String, usize> = HashMap::new();
            let mut target_slots = Vec::with_capacity(targets.len());
            for &(label, item) in targets {
                let key = self.keys.record_key(namespace, label, item);
                let index = *slot_of.entry(key.clone()).or_insert_with(|| {
                    slots.push(Slot {
                        label,
                        item,
                        key,
                        original: None,
                        next: None,
                        touched: false,
                    });
                    slots.len() - 1
                });
                target_slots.push(index);
            }

            let keys: Vec<String> = slots.iter().map(|slot| slot.key.clone()).collect();
            for (slot, record) in slots.iter_mut().zip(self.store.load_many(&keys)?) {
                slot.next = record.as_ref().map(|r| (r.signature.clone(), r.expires_at));
                slot.original = record;
            }
            let guarded = if guards.is_empty() {
                Vec::new()
            } else {
                self.store.load_many(guards)?
            };

            for (target, &index) in target_slots.iter().enumerate() {
                let slot = &mut slots[index];
                match plan(target, slot.next.as_ref().map(|(s, _)| s), &guarded, now) {
                    Change::Keep => {},
                    Change::Set {
                        signature,
                        expires_at,
                    } => {
                        slot.next = Some((signature, expires_at));
                        slot.touched = true;
                    },
                    Change::Remove => {
                        slot.next = None;
                        slot.touched = true;
                    },
                }
            }

            let mut batch = WriteBatch::new();
            for slot in &slots {
                self.stage(&mut batch, namespace, slot);
            }
            if batch.is_empty() {
                return Ok(());
            }
            for (key, record) in guards.iter().zip(&guarded) {
                batch.expect(key.clone(), record.as_ref().map(|r| r.version));
            }
            if self.store.commit(&batch)? {
                tracing::debug!(operation, attempt, ops = batch.ops().len(), "Committed write");
                return Ok(());
            }

            metrics::counter!("simidx_write_conflicts_total", "operation" => operation).increment(1);
            tracing::debug!(operation, attempt, "Write conflict, retrying");
        }

        tracing::warn!(operation, attempts, "Write retries exhausted");
        Err(Error::Conflict {
            operation: operation.to_string(),
            attempts,
        })
    }

    /// Adds the ops that move one slot from its original to its planned state.
    fn stage(&self, batch: &mut WriteBatch, namespace: &str, slot: &Slot<'_>) {
        if !slot.touched || (slot.original.is_none() && slot.next.is_none()) {
            return;
        }
        batch.expect(slot.key.clone(), slot.original.as_ref().map(|r| r.version));

        let old_buckets = slot
            .original
            .as_ref()
            .map(|r| self.bucket_keys(namespace, slot.label, &r.signature))
            .unwrap_or_default();

        let Some((signature, expires_at)) = &slot.next else {
            batch.push(WriteOp::Remove {
                key: slot.key.clone(),
            });
            for bucket in old_buckets {
                batch.push(WriteOp::RemoveMember {
                    bucket,
                    member: slot.item.to_string(),
                });
            }
            return;
        };

        let version = slot
            .original
            .as_ref()
            .map_or(1, |r| r.version.wrapping_add(1));
        batch.push(WriteOp::Put {
            key: slot.key.clone(),
            record: SignatureRecord::new(version, *expires_at, signature.clone()),
        });

        let new_buckets = self.bucket_keys(namespace, slot.label, signature);
        for bucket in old_buckets {
            if !new_buckets.contains(&bucket) {
                batch.push(WriteOp::RemoveMember {
                    bucket,
                    member: slot.item.to_string(),
                });
            }
        }
        for bucket in new_buckets {
            batch.push(WriteOp::AddMember {
                bucket,
                member: slot.item.to_string(),
                expires_at: *expires_at,
            });
        }
    }
}

fn count_operation(operation: &'static str) {
    metrics::counter!("simidx_operations_total", "operation" => operation).increment(1);
}
