//! Signature store trait.
//!
//! The store is the index's only state. It holds two kinds of entries:
//!
//! - **Records**: one [`SignatureRecord`] per key, expiring at its `expires_at`
//! - **Buckets**: keyed member sets where every member carries its own expiry
//!
//! # Atomicity
//!
//! All mutation goes through [`SignatureStore::commit`]. A [`WriteBatch`]
//! lists the record versions it was computed from; the store applies every
//! operation or none, and refuses the batch when any expectation no longer
//! holds. Readers therefore never observe a record without its bucket
//! memberships or the reverse.
//!
//! | Store | Mechanism |
//! |-------|-----------|
//! | `MemoryStore` | Single write lock over records and buckets |
//! | `RedisStore` | `WATCH` on expected keys, `MULTI`/`EXEC` for the ops |
//!
//! # Error Modes
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Ok(true)` | Batch applied |
//! | `Ok(false)` | An expectation failed; nothing was written |
//! | `Err(Error::Storage)` | Substrate failure; nothing was written that the store can detect |

use crate::storage::KeyPattern;
use crate::Result;
use crate::models::SignatureRecord;

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Stores a record, replacing any previous one.
    Put {
        /// Record key.
        key: String,
        /// The record; its `expires_at` is the key's expiry.
        record: SignatureRecord,
    },
    /// Removes a record.
    Remove {
        /// Record key.
        key: String,
    },
    /// Adds (or refreshes) a bucket member with its own expiry.
    AddMember {
        /// Bucket key.
        bucket: String,
        /// Member (item key).
        member: String,
        /// Member expiry as a Unix timestamp.
        expires_at: u64,
    },
    /// Removes a bucket member.
    RemoveMember {
        /// Bucket key.
        bucket: String,
        /// Member (item key).
        member: String,
    },
}

/// An all-or-nothing group of writes guarded by record versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    expectations: Vec<(String, Option<u64>)>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to hold `version` (`None`: no live record) at commit time.
    pub fn expect(&mut self, key: impl Into<String>, version: Option<u64>) -> &mut Self {
        self.expectations.push((key.into(), version));
        self
    }

    /// Appends an operation.
    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Returns the version expectations.
    #[must_use]
    pub fn expectations(&self) -> &[(String, Option<u64>)] {
        &self.expectations
    }

    /// Returns the operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Returns true if the batch carries no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Trait for signature stores.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn SignatureStore>`
/// - Expired records and members must be invisible to every read
/// - `members` returns members in a stable order (sorted by member key)
/// - `commit` must treat an expired record as absent when checking expectations
pub trait SignatureStore: Send + Sync {
    /// Returns the store's notion of the current Unix time in seconds.
    fn now(&self) -> u64;

    /// Loads a live record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, key: &str) -> Result<Option<SignatureRecord>>;

    /// Loads several live records, one slot per key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_many(&self, keys: &[String]) -> Result<Vec<Option<SignatureRecord>>> {
        keys.iter().map(|key| self.load(key)).collect()
    }

    /// Reads the live members of several buckets, one list per bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn members(&self, buckets: &[String]) -> Result<Vec<Vec<String>>>;

    /// Applies a batch atomically.
    ///
    /// Returns `Ok(false)` without writing anything when an expectation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn commit(&self, batch: &WriteBatch) -> Result<bool>;

    /// Deletes every record and bucket matching the pattern.
    ///
    /// Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize>;
}

impl<S: SignatureStore + ?Sized> SignatureStore for std::sync::Arc<S> {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn load(&self, key: &str) -> Result<Option<SignatureRecord>> {
        (**self).load(key)
    }

    fn load_many(&self, keys: &[String]) -> Result<Vec<Option<SignatureRecord>>> {
        (**self).load_many(keys)
    }

    fn members(&self, buckets: &[String]) -> Result<Vec<Vec<String>>> {
        (**self).members(buckets)
    }

    fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        (**self).commit(batch)
    }

    fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        (**self).delete_matching(pattern)
    }
}
