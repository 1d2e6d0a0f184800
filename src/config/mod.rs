//! Configuration management.
//!
//! Configuration is layered: defaults, then an optional TOML file, then
//! `SIMIDX_*` environment variables.
//!
//! ```toml
//! [index]
//! prefix = "sim"
//! permutations = 32
//! modulus = 65535
//! bands = 16
//! ttl_secs = 43200
//! candidate_limit = 1000
//!
//! [redis]
//! url = "redis://localhost:6379"
//! timeout_ms = 5000
//!
//! [storage]
//! breaker_failure_threshold = 5
//! ```

use crate::storage::StorageResilienceConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "sim";

/// Default record lifetime: 12 periods of one hour.
pub const DEFAULT_TTL_SECS: u64 = 12 * 60 * 60;

/// Index parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Prefix of every store key.
    pub prefix: String,
    /// Signature length.
    pub permutations: usize,
    /// Hash values are reduced modulo this.
    pub modulus: u32,
    /// Bands per signature; must divide `permutations`.
    pub bands: usize,
    /// Lifetime of records and bucket memberships, refreshed on every write.
    pub ttl_secs: u64,
    /// Caps the candidates scored per query.
    pub candidate_limit: Option<usize>,
    /// Optimistic write attempts before giving up with a conflict.
    pub max_write_attempts: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            permutations: 32,
            modulus: 0xFFFF,
            bands: 16,
            ttl_secs: DEFAULT_TTL_SECS,
            candidate_limit: None,
            max_write_attempts: 8,
        }
    }
}

impl IndexConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults overridden by environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `SIMIDX_*` environment overrides. Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| lookup(name).map(|v| v.trim().to_string());

        if let Some(prefix) = parse("SIMIDX_PREFIX").filter(|p| !p.is_empty()) {
            self.prefix = prefix;
        }
        if let Some(v) = parse("SIMIDX_PERMUTATIONS").and_then(|v| v.parse().ok()) {
            self.permutations = v;
        }
        if let Some(v) = parse("SIMIDX_MODULUS").and_then(|v| parse_modulus(&v)) {
            self.modulus = v;
        }
        if let Some(v) = parse("SIMIDX_BANDS").and_then(|v| v.parse().ok()) {
            self.bands = v;
        }
        if let Some(v) = parse("SIMIDX_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.ttl_secs = v;
        }
        if let Some(v) = parse("SIMIDX_CANDIDATE_LIMIT") {
            match v.to_lowercase().as_str() {
                "" | "0" | "none" => self.candidate_limit = None,
                other => {
                    if let Ok(limit) = other.parse() {
                        self.candidate_limit = Some(limit);
                    }
                },
            }
        }
        if let Some(v) = parse("SIMIDX_MAX_WRITE_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_write_attempts = v;
        }
        self
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Configuration(msg));
        if self.prefix.is_empty() {
            return fail("prefix must not be empty".to_string());
        }
        if self.permutations == 0 {
            return fail("permutations must be positive".to_string());
        }
        if self.modulus == 0 {
            return fail("modulus must be positive".to_string());
        }
        if self.bands == 0 || self.permutations % self.bands != 0 {
            return fail(format!(
                "{} bands do not evenly divide {} permutations",
                self.bands, self.permutations
            ));
        }
        if self.ttl_secs == 0 {
            return fail("ttl_secs must be positive".to_string());
        }
        if self.max_write_attempts == 0 {
            return fail("max_write_attempts must be positive".to_string());
        }
        Ok(())
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets signature length and band count together.
    #[must_use]
    pub const fn with_shape(mut self, permutations: usize, bands: usize) -> Self {
        self.permutations = permutations;
        self.bands = bands;
        self
    }

    /// Sets the modulus.
    #[must_use]
    pub const fn with_modulus(mut self, modulus: u32) -> Self {
        self.modulus = modulus;
        self
    }

    /// Sets the record lifetime.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Caps the candidates scored per query.
    #[must_use]
    pub const fn with_candidate_limit(mut self, limit: Option<usize>) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Sets the optimistic write attempts.
    #[must_use]
    pub const fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts;
        self
    }
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_modulus(value: &str) -> Option<u32> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map_or_else(|| value.parse().ok(), |hex| u32::from_str_radix(hex, 16).ok())
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// Connection URL.
    pub url: String,
    /// Read and write timeout per command.
    pub timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl RedisSettings {
    /// Applies `SIMIDX_REDIS_URL` and `SIMIDX_REDIS_TIMEOUT_MS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SIMIDX_REDIS_URL") {
            if !url.trim().is_empty() {
                self.url = url.trim().to_string();
            }
        }
        if let Some(ms) = std::env::var("SIMIDX_REDIS_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.timeout_ms = ms;
        }
        self
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimidxConfig {
    /// Index parameters.
    pub index: IndexConfig,
    /// Redis connection.
    pub redis: RedisSettings,
    /// Circuit breaker settings.
    pub resilience: StorageResilienceConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Index section.
    pub index: Option<ConfigFileIndex>,
    /// Redis section.
    pub redis: Option<ConfigFileRedis>,
    /// Storage resilience section.
    pub storage: Option<ConfigFileStorage>,
}

/// `[index]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileIndex {
    /// Key prefix.
    pub prefix: Option<String>,
    /// Signature length.
    pub permutations: Option<usize>,
    /// Modulus.
    pub modulus: Option<u32>,
    /// Bands.
    pub bands: Option<usize>,
    /// TTL in seconds.
    pub ttl_secs: Option<u64>,
    /// Candidate cap; `0` disables it.
    pub candidate_limit: Option<usize>,
    /// Write attempts.
    pub max_write_attempts: Option<u32>,
}

/// `[redis]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileRedis {
    /// Connection URL.
    pub url: Option<String>,
    /// Command timeout.
    pub timeout_ms: Option<u64>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileStorage {
    /// Consecutive failures before the breaker opens.
    pub breaker_failure_threshold: Option<u32>,
    /// Open duration before half-open.
    pub breaker_reset_timeout_ms: Option<u64>,
    /// Half-open trial calls.
    pub breaker_half_open_max_calls: Option<u32>,
}

impl SimidxConfig {
    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed,
    /// or if the resulting index parameters are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;

        let config = Self::from_config_file(file).with_env_overrides();
        config.index.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<config dir>/simidx/config.toml` then `~/.config/simidx/config.toml`.
    /// Falls back to defaults plus environment overrides when neither loads.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let candidates = [
            base_dirs.config_dir().join("simidx").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("simidx")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring config file"),
            }
        }

        Self::default().with_env_overrides()
    }

    /// Applies environment overrides to every section.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            index: self.index.with_env_overrides(),
            redis: self.redis.with_env_overrides(),
            resilience: self.resilience.with_env_overrides(),
        }
    }

    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(index) = file.index {
            let target = &mut config.index;
            if let Some(v) = index.prefix {
                target.prefix = v;
            }
            if let Some(v) = index.permutations {
                target.permutations = v;
            }
            if let Some(v) = index.modulus {
                target.modulus = v;
            }
            if let Some(v) = index.bands {
                target.bands = v;
            }
            if let Some(v) = index.ttl_secs {
                target.ttl_secs = v;
            }
            if let Some(v) = index.candidate_limit {
                target.candidate_limit = (v > 0).then_some(v);
            }
            if let Some(v) = index.max_write_attempts {
                target.max_write_attempts = v;
            }
        }
        if let Some(redis) = file.redis {
            if let Some(v) = redis.url {
                config.redis.url = v;
            }
            if let Some(v) = redis.timeout_ms {
                config.redis.timeout_ms = v;
            }
        }
        if let Some(storage) = file.storage {
            let target = &mut config.resilience;
            if let Some(v) = storage.breaker_failure_threshold {
                target.breaker_failure_threshold = v;
            }
            if let Some(v) = storage.breaker_reset_timeout_ms {
                target.breaker_reset_timeout_ms = v;
            }
            if let Some(v) = storage.breaker_half_open_max_calls {
                target.breaker_half_open_max_calls = v;
            }
        }

        config
    }
}
