//! In-memory signature store.
//!
//! Provides a non-persistent implementation of [`SignatureStore`] for tests,
//! development, and single-process embedding. Records and buckets live behind
//! one `RwLock`, so a committed batch is observed whole or not at all.

use super::clock::{Clock, SystemClock};
use super::traits::{SignatureStore, WriteBatch, WriteOp};
use super::KeyPattern;
use crate::models::SignatureRecord;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, SignatureRecord>,
    /// bucket key -> (member -> expiry)
    buckets: HashMap<String, BTreeMap<String, u64>>,
}

/// In-memory signature store.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use simidx::storage::{ManualClock, MemoryStore, SignatureStore};
///
/// let clock = Arc::new(ManualClock::new(1_000));
/// let store = MemoryStore::with_clock(clock.clone());
/// assert_eq!(store.now(), 1_000);
/// ```
pub struct MemoryStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.record_count())
            .field("buckets", &self.bucket_count())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store on wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store driven by the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
        }
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        let now = self.clock.now();
        self.state
            .read()
            .map(|s| s.records.values().filter(|r| r.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Returns the number of buckets holding at least one live member.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        let now = self.clock.now();
        self.state
            .read()
            .map(|s| {
                s.buckets
                    .values()
                    .filter(|members| members.values().any(|expiry| *expiry > now))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Returns how many live bucket memberships `member` holds across all buckets.
    #[must_use]
    pub fn membership_count(&self, member: &str) -> usize {
        let now = self.clock.now();
        self.state
            .read()
            .map(|s| {
                s.buckets
                    .values()
                    .filter(|members| members.get(member).is_some_and(|expiry| *expiry > now))
                    .count()
            })
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| Error::storage("memory_read_lock", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| Error::storage("memory_write_lock", e))
    }
}

impl State {
    fn live_version(&self, key: &str, now: u64) -> Option<u64> {
        self.records
            .get(key)
            .filter(|r| r.is_live(now))
            .map(|r| r.version)
    }

    /// Drops expired records, expired members, and buckets left empty.
    fn sweep(&mut self, now: u64) {
        self.records.retain(|_, record| record.is_live(now));
        self.buckets.retain(|_, members| {
            members.retain(|_, expiry| *expiry > now);
            !members.is_empty()
        });
    }

    fn apply(&mut self, op: &WriteOp, now: u64) {
        match op {
            WriteOp::Put { key, record } => {
                self.records.insert(key.clone(), record.clone());
            },
            WriteOp::Remove { key } => {
                self.records.remove(key);
            },
            WriteOp::AddMember {
                bucket,
                member,
                expires_at,
            } => {
                let members = self.buckets.entry(bucket.clone()).or_default();
                members.retain(|_, expiry| *expiry > now);
                members.insert(member.clone(), *expires_at);
            },
            WriteOp::RemoveMember { bucket, member } => {
                if let Some(members) = self.buckets.get_mut(bucket) {
                    members.remove(member);
                    if members.is_empty() {
                        self.buckets.remove(bucket);
                    }
                }
            },
        }
    }
}

impl SignatureStore for MemoryStore {
    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn load(&self, key: &str) -> Result<Option<SignatureRecord>> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(state.records.get(key).filter(|r| r.is_live(now)).cloned())
    }

    fn load_many(&self, keys: &[String]) -> Result<Vec<Option<SignatureRecord>>> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(keys
            .iter()
            .map(|key| state.records.get(key).filter(|r| r.is_live(now)).cloned())
            .collect())
    }

    fn members(&self, buckets: &[String]) -> Result<Vec<Vec<String>>> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(buckets
            .iter()
            .map(|bucket| {
                state
                    .buckets
                    .get(bucket)
                    .map(|members| {
                        members
                            .iter()
                            .filter(|(_, expiry)| **expiry > now)
                            .map(|(member, _)| member.clone())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        let now = self.clock.now();
        let mut state = self.write()?;

        let satisfied = batch
            .expectations()
            .iter()
            .all(|(key, expected)| state.live_version(key, now) == *expected);
        if !satisfied {
            return Ok(false);
        }

        for op in batch.ops() {
            state.apply(op, now);
        }
        state.sweep(now);
        Ok(true)
    }

    fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        let matcher = pattern.to_regex()?;
        let now = self.clock.now();
        let mut state = self.write()?;
        state.sweep(now);
        let before = state.records.len() + state.buckets.len();
        state.records.retain(|key, _| !matcher.is_match(key));
        state.buckets.retain(|key, _| !matcher.is_match(key));
        Ok(before - (state.records.len() + state.buckets.len()))
    }
}
