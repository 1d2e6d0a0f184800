//! Storage traits.

mod store;

pub use store::{SignatureStore, WriteBatch, WriteOp};
