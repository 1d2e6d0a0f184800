//! Storage layer abstraction.
//!
//! The index keeps all of its state in a [`SignatureStore`]:
//! - **Memory**: `RwLock` maps with an injectable [`Clock`], for tests and embedding
//! - **Redis**: strings and sorted sets, behind the `redis` feature
//!
//! [`ResilientStore`] adds circuit breaking in front of either.

// Allow significant_drop_tightening - guards are held across short, bounded sections.
#![allow(clippy::significant_drop_tightening)]
// Allow manual_let_else for clearer error handling in some contexts.
#![allow(clippy::manual_let_else)]
// Allow match_same_arms for explicit enum handling.
#![allow(clippy::match_same_arms)]

mod clock;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod resilience;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use keys::{KeyPattern, KeySpace};
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use resilience::{CircuitBreaker, ResilientStore, StorageResilienceConfig};
pub use traits::{SignatureStore, WriteBatch, WriteOp};
