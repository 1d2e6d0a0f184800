//! # simidx
//!
//! A MinHash locality-sensitive-hashing similarity index.
//!
//! Features (tokens, token bags, or text) are reduced to fixed-length MinHash
//! signatures, split into bands, and recorded under `(namespace, label, key)`
//! in a shared key-value store. Queries retrieve candidates that share bands
//! with the query and rank them by estimated Jaccard similarity.
//!
//! ## Features
//!
//! - Deterministic MinHash signatures (`xxh3` seeded per permutation)
//! - Banded LSH buckets with per-member expiry
//! - Multi-label comparison with `None` vs `0.0` score distinction
//! - Atomic record / merge / delete / import via versioned write batches
//! - Portable export/import blobs carrying the remaining TTL
//! - Pluggable stores (in-memory, Redis)
//!
//! ## Example
//!
//! ```rust
//! use simidx::{Feature, IndexConfig, MinHashIndex};
//! use simidx::storage::MemoryStore;
//!
//! let index = MinHashIndex::new(IndexConfig::default(), MemoryStore::new())?;
//! index.record("example", "1", &[("title", Feature::text("hello world"))])?;
//! index.record("example", "2", &[("title", Feature::text("hello world"))])?;
//!
//! let results = index.compare("example", "1", &[("title", 0)], None)?;
//! assert_eq!(results[0].key, "1");
//! assert_eq!(results[0].scores, vec![Some(1.0)]);
//! # Ok::<(), simidx::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod similarity;
pub mod storage;

// Re-exports for convenience
pub use config::{IndexConfig, RedisSettings, SimidxConfig};
pub use models::{Feature, Signature, SimilarityMatch};
pub use similarity::{
    ALL_NAMESPACES, Banding, MinHashIndex, MinHashSignatureBuilder, compare_signatures,
};
pub use storage::{MemoryStore, SignatureStore};

/// Error type for simidx operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Zero permutations, zero modulus, bands not dividing the signature, zero TTL |
/// | `NotFound` | `MinHashIndex::signature` is asked for a key with no record |
/// | `Storage` | The store is unreachable or a command fails |
/// | `Conflict` | Concurrent writers kept invalidating an optimistic write |
/// | `Serialization` | An export blob or a stored record cannot be decoded |
/// | `InvalidInput` | Malformed CLI arguments or hex blobs |
/// | `FeatureNotEnabled` | Using the Redis store without the `redis` cargo feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid index parameters.
    ///
    /// Raised at construction and never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No record exists for the requested key and label.
    ///
    /// Comparison operations report missing data as `None` scores instead.
    #[error("no signature recorded for key '{key}' under label '{label}'")]
    NotFound {
        /// The index label.
        label: String,
        /// The item key.
        key: String,
    },

    /// A storage operation failed.
    ///
    /// Raised when:
    /// - The Redis server is unreachable or times out
    /// - A command returns an error reply
    /// - A lock guarding the in-memory store is poisoned
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An optimistic write kept losing races with concurrent writers.
    #[error("operation '{operation}' abandoned after {attempts} conflicting attempts")]
    Conflict {
        /// The operation that was abandoned.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A blob or stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Builds a [`Error::Storage`] from an operation name and any displayable cause.
    pub fn storage(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for simidx operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// ```rust
/// let ts = simidx::current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("bands must divide permutations".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: bands must divide permutations"
        );

        let err = Error::storage("load", "connection refused");
        assert_eq!(
            err.to_string(),
            "storage operation 'load' failed: connection refused"
        );

        let err = Error::NotFound {
            label: "title".to_string(),
            key: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no signature recorded for key '42' under label 'title'"
        );

        let err = Error::Conflict {
            operation: "record".to_string(),
            attempts: 8,
        };
        assert_eq!(
            err.to_string(),
            "operation 'record' abandoned after 8 conflicting attempts"
        );
    }
}
