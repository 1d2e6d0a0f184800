//! Stored signature records.

use super::Signature;

/// A signature as held by a store.
///
/// `version` increases on every write to the same key and guards optimistic
/// write batches. `expires_at` is a Unix timestamp in seconds; the record and
/// its bucket memberships stop being visible at that instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Per-key write stamp.
    pub version: u64,
    /// Expiry as a Unix timestamp (seconds).
    pub expires_at: u64,
    /// The recorded signature.
    pub signature: Signature,
}

impl SignatureRecord {
    /// Creates a record.
    #[must_use]
    pub const fn new(version: u64, expires_at: u64, signature: Signature) -> Self {
        Self {
            version,
            expires_at,
            signature,
        }
    }

    /// Returns true if the record is still live at `now`.
    #[must_use]
    pub const fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }

    /// Seconds left before expiry, relative to `timestamp`.
    ///
    /// Negative when the record expired before `timestamp`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn remaining_ttl(&self, timestamp: u64) -> i64 {
        self.expires_at as i64 - timestamp as i64
    }
}
