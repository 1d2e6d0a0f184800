//! Data models for simidx.
//!
//! This module contains the value types shared by the signature builder, the
//! index backend and the stores.

mod feature;
mod matches;
mod record;
mod signature;

pub use feature::Feature;
pub use matches::SimilarityMatch;
pub use record::SignatureRecord;
pub use signature::Signature;
