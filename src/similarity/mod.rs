//! MinHash similarity.
//!
//! Signatures are built by [`MinHashSignatureBuilder`], split into bands by
//! [`Banding`], scored by [`compare_signatures`], and indexed by
//! [`MinHashIndex`].

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]

pub mod banding;
pub mod builder;
pub mod codec;
pub mod index;
pub mod scoring;

pub use banding::Banding;
pub use builder::MinHashSignatureBuilder;
pub use codec::{ExportedSignature, FORMAT_VERSION, decode_export, encode_export};
pub use index::{ALL_NAMESPACES, MinHashIndex};
pub use scoring::{compare_signatures, component_score, rank};
