//! Logging configuration.

use std::path::PathBuf;
use std::str::FromStr;

/// Default filter when nothing else is configured.
pub const DEFAULT_FILTER: &str = "info";

/// Filter used for `--verbose`.
pub const VERBOSE_FILTER: &str = "debug";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `simidx=debug,info`.
    pub filter: String,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Reads `SIMIDX_LOG` (falling back to `RUST_LOG`), `SIMIDX_LOG_FORMAT`
    /// and `SIMIDX_LOG_FILE`.
    ///
    /// `verbose` forces the `debug` filter.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_lookup(verbose, |name| std::env::var(name).ok())
    }

    /// Same as [`LoggingConfig::from_env`] over an arbitrary lookup.
    #[must_use]
    pub fn from_lookup(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let filter = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            non_empty("SIMIDX_LOG")
                .or_else(|| non_empty("RUST_LOG"))
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };
        let format = non_empty("SIMIDX_LOG_FORMAT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let file = non_empty("SIMIDX_LOG_FILE").map(PathBuf::from);

        Self {
            format,
            filter,
            file,
        }
    }

    /// Overrides the format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}
