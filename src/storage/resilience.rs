//! Circuit breaking for signature stores.
//!
//! [`ResilientStore`] wraps any [`SignatureStore`] and stops calling it after
//! repeated substrate failures, so a dead Redis fails fast instead of stalling
//! every index call on its timeout.
//!
//! # Circuit Breaker States
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  success                               | reset timeout elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! A version conflict (`commit` returning `Ok(false)`) is a healthy answer and
//! counts as a success.
//!
//! # Usage
//!
//! ```rust
//! use simidx::storage::{MemoryStore, ResilientStore, SignatureStore, StorageResilienceConfig};
//!
//! let store = ResilientStore::new(MemoryStore::new(), StorageResilienceConfig::default(), "memory");
//! assert!(store.load("sim:ns:label:s:1")?.is_none());
//! # Ok::<(), simidx::Error>(())
//! ```

use super::traits::{SignatureStore, WriteBatch};
use super::KeyPattern;
use crate::models::SignatureRecord;
use crate::{Error, Result};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Resilience configuration for signature stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResilienceConfig {
    /// Consecutive failures before opening the circuit.
    pub breaker_failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub breaker_reset_timeout_ms: u64,
    /// Maximum trial calls while half-open.
    pub breaker_half_open_max_calls: u32,
}

impl Default for StorageResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 30_000,
            breaker_half_open_max_calls: 1,
        }
    }
}

impl StorageResilienceConfig {
    /// Loads resilience configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `SIMIDX_STORAGE_BREAKER_*` overrides. Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(parsed) = env_parse::<u32>("SIMIDX_STORAGE_BREAKER_FAILURE_THRESHOLD") {
            self.breaker_failure_threshold = parsed.max(1);
        }
        if let Some(parsed) = env_parse::<u64>("SIMIDX_STORAGE_BREAKER_RESET_MS") {
            self.breaker_reset_timeout_ms = parsed;
        }
        if let Some(parsed) = env_parse::<u32>("SIMIDX_STORAGE_BREAKER_HALF_OPEN_MAX_CALLS") {
            self.breaker_half_open_max_calls = parsed.max(1);
        }
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout in milliseconds.
    #[must_use]
    pub const fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.breaker_reset_timeout_ms = timeout_ms;
        self
    }

    /// Sets the half-open max calls.
    #[must_use]
    pub const fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.breaker_half_open_max_calls = max_calls;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { trials: u32 },
}

/// Circuit breaker state machine for one store.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
    store_name: &'static str,
}

impl CircuitBreaker {
    /// Creates a closed breaker. Zero thresholds are raised to one.
    #[must_use]
    pub fn new(config: &StorageResilienceConfig, store_name: &'static str) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.breaker_failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.breaker_reset_timeout_ms),
            half_open_max_calls: config.breaker_half_open_max_calls.max(1),
            store_name,
        }
    }

    /// Returns `true` if a call may proceed.
    pub fn allow(&mut self) -> bool {
        match &mut self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() < self.reset_timeout {
                    return false;
                }
                tracing::info!(store = self.store_name, "Circuit breaker half-open");
                self.state = BreakerState::HalfOpen { trials: 0 };
                true
            },
            BreakerState::HalfOpen { trials } => {
                if *trials >= self.half_open_max_calls {
                    false
                } else {
                    *trials += 1;
                    true
                }
            },
        }
    }

    /// Records a successful call and closes the circuit.
    pub fn on_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { .. }) {
            tracing::info!(store = self.store_name, "Circuit breaker closed");
        }
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failed call. Returns `true` if this failure opened the circuit.
    pub fn on_failure(&mut self) -> bool {
        let opened = match &mut self.state {
            BreakerState::Closed { failures } => {
                *failures += 1;
                *failures >= self.failure_threshold
            },
            BreakerState::HalfOpen { .. } => true,
            BreakerState::Open { .. } => false,
        };
        if opened {
            tracing::warn!(
                store = self.store_name,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
            self.state = BreakerState::Open {
                opened_at: Instant::now(),
            };
        }
        opened
    }

    /// Returns the state for metrics: 0 closed, 1 open, 2 half-open.
    #[must_use]
    pub const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen { .. } => 2,
        }
    }

    /// Returns the store name used in logs and metrics.
    #[must_use]
    pub const fn store_name(&self) -> &'static str {
        self.store_name
    }
}

/// A [`SignatureStore`] guarded by a [`CircuitBreaker`].
pub struct ResilientStore<S: SignatureStore> {
    inner: S,
    breaker: Mutex<CircuitBreaker>,
    store_name: &'static str,
}

impl<S: SignatureStore> ResilientStore<S> {
    /// Wraps a store.
    #[must_use]
    pub fn new(inner: S, config: StorageResilienceConfig, store_name: &'static str) -> Self {
        Self {
            inner,
            breaker: Mutex::new(CircuitBreaker::new(&config, store_name)),
            store_name,
        }
    }

    /// Returns the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the breaker state (see [`CircuitBreaker::state_value`]).
    #[must_use]
    pub fn breaker_state(&self) -> u8 {
        self.breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state_value()
    }

    fn execute<T>(&self, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let (allowed, state) = {
            let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
            (breaker.allow(), breaker.state_value())
        };
        if !allowed {
            self.record_metrics(operation, "circuit_open", state);
            return Err(Error::Storage {
                operation: operation.to_string(),
                cause: format!("circuit breaker open for store '{}'", self.store_name),
            });
        }

        let result = call();

        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        let (status, tripped) = if result.is_ok() {
            breaker.on_success();
            ("success", false)
        } else {
            ("error", breaker.on_failure())
        };
        let state = breaker.state_value();
        drop(breaker);

        self.record_metrics(operation, status, state);
        if tripped {
            metrics::counter!(
                "storage_circuit_breaker_trips_total",
                "backend" => self.store_name,
                "operation" => operation
            )
            .increment(1);
        }
        result
    }

    fn record_metrics(&self, operation: &'static str, status: &'static str, state: u8) {
        metrics::counter!(
            "storage_requests_total",
            "backend" => self.store_name,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::gauge!("storage_circuit_breaker_state", "backend" => self.store_name)
            .set(f64::from(state));
    }
}

impl<S: SignatureStore> SignatureStore for ResilientStore<S> {
    fn now(&self) -> u64 {
        // Pure clock read, no substrate call.
        self.inner.now()
    }

    fn load(&self, key: &str) -> Result<Option<SignatureRecord>> {
        self.execute("load", || self.inner.load(key))
    }

    fn load_many(&self, keys: &[String]) -> Result<Vec<Option<SignatureRecord>>> {
        self.execute("load_many", || self.inner.load_many(keys))
    }

    fn members(&self, buckets: &[String]) -> Result<Vec<Vec<String>>> {
        self.execute("members", || self.inner.members(buckets))
    }

    fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        self.execute("commit", || self.inner.commit(batch))
    }

    fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        self.execute("delete_matching", || self.inner.delete_matching(pattern))
    }
}
