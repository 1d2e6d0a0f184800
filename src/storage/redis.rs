//! Redis signature store.
//!
//! | Entry | Redis type | Expiry |
//! |-------|------------|--------|
//! | Record | string (binary record encoding) | `SET .. EXAT` |
//! | Bucket | sorted set, member score = member expiry | `EXPIREAT` tracks the latest member |
//!
//! Commits `WATCH` every expected record key, verify versions, then apply the
//! batch inside `MULTI`/`EXEC`. A concurrent writer touching a watched key
//! aborts the `EXEC`, which surfaces as a version conflict.
//!
//! # Connection Management
//!
//! A single connection is reused per store via `Mutex<Option<Connection>>`.
//! A connection that saw an error is dropped rather than returned, so a
//! half-read reply or dangling `WATCH` never leaks into the next call.

#[cfg(feature = "redis")]
mod implementation {
    use crate::config::RedisSettings;
    use crate::models::SignatureRecord;
    use crate::similarity::codec::{decode_record, encode_record};
    use crate::storage::traits::{SignatureStore, WriteBatch, WriteOp};
    use crate::storage::KeyPattern;
    use crate::{Error, Result};
    use redis::{Client, Connection, RedisError};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Keys requested per `SCAN` round trip.
    const SCAN_COUNT: usize = 500;

    /// Keys removed per `DEL`.
    const DELETE_CHUNK: usize = 500;

    fn redis_error(operation: &'static str) -> impl FnOnce(RedisError) -> Error {
        move |e| Error::storage(operation, e)
    }

    /// Redis-backed signature store.
    pub struct RedisStore {
        client: Client,
        timeout: Duration,
        connection: Mutex<Option<Connection>>,
    }

    impl RedisStore {
        /// Creates a store for the given URL with a per-command timeout.
        ///
        /// No connection is opened until the first call.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL cannot be parsed.
        pub fn new(url: &str, timeout: Duration) -> Result<Self> {
            let client = Client::open(url).map_err(redis_error("redis_open"))?;
            Ok(Self {
                client,
                timeout,
                connection: Mutex::new(None),
            })
        }

        /// Creates a store from [`RedisSettings`].
        ///
        /// # Errors
        ///
        /// Returns an error if the URL cannot be parsed.
        pub fn from_settings(settings: &RedisSettings) -> Result<Self> {
            Self::new(&settings.url, Duration::from_millis(settings.timeout_ms))
        }

        /// Round-trips a `PING`.
        ///
        /// # Errors
        ///
        /// Returns an error if Redis is unreachable.
        pub fn ping(&self) -> Result<()> {
            self.with_connection(|conn| {
                redis::cmd("PING")
                    .query::<String>(conn)
                    .map(|_| ())
                    .map_err(redis_error("redis_ping"))
            })
        }

        fn get_connection(&self) -> Result<Connection> {
            let mut guard = self
                .connection
                .lock()
                .map_err(|e| Error::storage("redis_lock_connection", e))?;
            if let Some(conn) = guard.take() {
                return Ok(conn);
            }
            drop(guard);

            let conn = self
                .client
                .get_connection()
                .map_err(redis_error("redis_get_connection"))?;
            conn.set_read_timeout(Some(self.timeout))
                .map_err(redis_error("redis_set_read_timeout"))?;
            conn.set_write_timeout(Some(self.timeout))
                .map_err(redis_error("redis_set_write_timeout"))?;
            Ok(conn)
        }

        fn return_connection(&self, conn: Connection) {
            if let Ok(mut guard) = self.connection.lock() {
                *guard = Some(conn);
            }
        }

        fn with_connection<T>(&self, call: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
            let mut conn = self.get_connection()?;
            let result = call(&mut conn);
            if result.is_ok() {
                self.return_connection(conn);
            }
            result
        }

        fn live_version(conn: &mut Connection, key: &str, now: u64) -> Result<Option<u64>> {
            let raw: Option<Vec<u8>> = redis::cmd("GET")
                .arg(key)
                .query(conn)
                .map_err(redis_error("redis_get"))?;
            Ok(raw
                .map(|bytes| decode_record(&bytes))
                .transpose()?
                .filter(|record| record.is_live(now))
                .map(|record| record.version))
        }

        fn commit_on(conn: &mut Connection, batch: &WriteBatch, now: u64) -> Result<bool> {
            let expectations = batch.expectations();
            if !expectations.is_empty() {
                let keys: Vec<&str> = expectations.iter().map(|(key, _)| key.as_str()).collect();
                redis::cmd("WATCH")
                    .arg(&keys)
                    .query::<()>(conn)
                    .map_err(redis_error("redis_watch"))?;

                for (key, expected) in expectations {
                    if Self::live_version(conn, key, now)? != *expected {
                        redis::cmd("UNWATCH")
                            .query::<()>(conn)
                            .map_err(redis_error("redis_unwatch"))?;
                        return Ok(false);
                    }
                }
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for op in batch.ops() {
                match op {
                    WriteOp::Put { key, record } => {
                        pipe.cmd("SET")
                            .arg(key)
                            .arg(encode_record(record))
                            .arg("EXAT")
                            .arg(record.expires_at)
                            .ignore();
                    },
                    WriteOp::Remove { key } => {
                        pipe.cmd("DEL").arg(key).ignore();
                    },
                    WriteOp::AddMember {
                        bucket,
                        member,
                        expires_at,
                    } => {
                        pipe.cmd("ZREMRANGEBYSCORE")
                            .arg(bucket)
                            .arg("-inf")
                            .arg(now)
                            .ignore();
                        pipe.cmd("ZADD")
                            .arg(bucket)
                            .arg(*expires_at)
                            .arg(member)
                            .ignore();
                        // NX covers a fresh bucket, GT only ever extends.
                        pipe.cmd("EXPIREAT")
                            .arg(bucket)
                            .arg(*expires_at)
                            .arg("NX")
                            .ignore();
                        pipe.cmd("EXPIREAT")
                            .arg(bucket)
                            .arg(*expires_at)
                            .arg("GT")
                            .ignore();
                    },
                    WriteOp::RemoveMember { bucket, member } => {
                        pipe.cmd("ZREM").arg(bucket).arg(member).ignore();
                    },
                }
            }

            let response: Option<Vec<redis::Value>> =
                pipe.query(conn).map_err(redis_error("redis_exec"))?;
            Ok(response.is_some())
        }

        fn scan_matching(conn: &mut Connection, pattern: &KeyPattern) -> Result<Vec<String>> {
            let glob = pattern.to_glob();
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&glob)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(conn)
                    .map_err(redis_error("redis_scan"))?;
                // SCAN's glob `*` can cross segments.
                keys.extend(batch.into_iter().filter(|key| pattern.matches(key)));
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            keys.sort_unstable();
            keys.dedup();
            Ok(keys)
        }
    }

    impl SignatureStore for RedisStore {
        fn now(&self) -> u64 {
            crate::current_timestamp()
        }

        fn load(&self, key: &str) -> Result<Option<SignatureRecord>> {
            let mut records = self.load_many(&[key.to_string()])?;
            Ok(records.pop().flatten())
        }

        fn load_many(&self, keys: &[String]) -> Result<Vec<Option<SignatureRecord>>> {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let now = self.now();
            let raw: Vec<Option<Vec<u8>>> = self.with_connection(|conn| {
                redis::cmd("MGET")
                    .arg(keys)
                    .query(conn)
                    .map_err(redis_error("redis_mget"))
            })?;
            raw.into_iter()
                .map(|bytes| {
                    Ok(bytes
                        .map(|b| decode_record(&b))
                        .transpose()?
                        .filter(|record| record.is_live(now)))
                })
                .collect()
        }

        fn members(&self, buckets: &[String]) -> Result<Vec<Vec<String>>> {
            if buckets.is_empty() {
                return Ok(Vec::new());
            }
            let now = self.now();
            let min = format!("({now}");
            self.with_connection(|conn| {
                let mut pipe = redis::pipe();
                for bucket in buckets {
                    pipe.cmd("ZRANGEBYSCORE").arg(bucket).arg(&min).arg("+inf");
                }
                let mut members: Vec<Vec<String>> =
                    pipe.query(conn).map_err(redis_error("redis_zrangebyscore"))?;
                for list in &mut members {
                    list.sort_unstable();
                }
                Ok(members)
            })
        }

        fn commit(&self, batch: &WriteBatch) -> Result<bool> {
            let now = self.now();
            self.with_connection(|conn| Self::commit_on(conn, batch, now))
        }

        fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
            self.with_connection(|conn| {
                let keys = Self::scan_matching(conn, pattern)?;
                let mut removed = 0;
                for chunk in keys.chunks(DELETE_CHUNK) {
                    let count: usize = redis::cmd("DEL")
                        .arg(chunk)
                        .query(conn)
                        .map_err(redis_error("redis_del"))?;
                    removed += count;
                }
                tracing::debug!(pattern = %pattern.to_glob(), removed, "Deleted matching keys");
                Ok(removed)
            })
        }
    }
}

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::config::RedisSettings;
    use crate::models::SignatureRecord;
    use crate::storage::traits::{SignatureStore, WriteBatch};
    use crate::storage::KeyPattern;
    use crate::{Error, Result};
    use std::time::Duration;

    fn disabled<T>() -> Result<T> {
        Err(Error::FeatureNotEnabled("redis".to_string()))
    }

    /// Stub Redis store when the `redis` feature is not enabled.
    pub struct RedisStore;

    impl RedisStore {
        /// Creates a new Redis store (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_url: &str, _timeout: Duration) -> Result<Self> {
            disabled()
        }

        /// Creates a store from settings (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn from_settings(_settings: &RedisSettings) -> Result<Self> {
            disabled()
        }

        /// Pings Redis (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn ping(&self) -> Result<()> {
            disabled()
        }
    }

    impl SignatureStore for RedisStore {
        fn now(&self) -> u64 {
            crate::current_timestamp()
        }

        fn load(&self, _key: &str) -> Result<Option<SignatureRecord>> {
            disabled()
        }

        fn members(&self, _buckets: &[String]) -> Result<Vec<Vec<String>>> {
            disabled()
        }

        fn commit(&self, _batch: &WriteBatch) -> Result<bool> {
            disabled()
        }

        fn delete_matching(&self, _pattern: &KeyPattern) -> Result<usize> {
            disabled()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_stub_reports_missing_feature() {
            let result = RedisStore::new("redis://localhost:6379", Duration::from_secs(1));
            assert!(matches!(result, Err(Error::FeatureNotEnabled(ref f)) if f == "redis"));
        }
    }
}

#[cfg(feature = "redis")]
pub use implementation::RedisStore;

#[cfg(not(feature = "redis"))]
pub use stub::RedisStore;
