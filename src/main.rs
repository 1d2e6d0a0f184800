//! Binary entry point for simidx.
//!
//! This binary provides an administrative CLI over a Redis-backed index.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simidx::cli::{self, FeatureArg};
use simidx::config::SimidxConfig;
use simidx::observability::{self, LogFormat, LoggingConfig};
use simidx::storage::{RedisStore, ResilientStore};
use simidx::{MinHashIndex, current_timestamp};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// simidx - MinHash LSH similarity index administration.
#[derive(Parser)]
#[command(name = "simidx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format: pretty or json.
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Redis connection URL.
    #[arg(long, global = true, env = "SIMIDX_REDIS_URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Record features for an item.
    Record {
        /// Namespace.
        namespace: String,
        /// Item key.
        key: String,
        /// Text feature as `label=text` (repeatable).
        #[arg(short, long = "feature")]
        features: Vec<String>,
        /// Token feature as `label=a,b,c` (repeatable).
        #[arg(short, long = "tokens")]
        tokens: Vec<String>,
    },

    /// Rank items similar to a recorded item.
    Compare {
        /// Namespace.
        namespace: String,
        /// Item key of the query.
        key: String,
        /// Label as `label[:threshold]` (repeatable).
        #[arg(short, long = "label", required = true)]
        labels: Vec<String>,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rank items similar to ad-hoc features.
    Classify {
        /// Namespace.
        namespace: String,
        /// Text feature as `label[:threshold]=text` (repeatable).
        #[arg(short, long = "feature")]
        features: Vec<String>,
        /// Token feature as `label[:threshold]=a,b,c` (repeatable).
        #[arg(short, long = "tokens")]
        tokens: Vec<String>,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete records.
    Delete {
        /// Namespace.
        namespace: String,
        /// Entries as `label=key`.
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Union source records into a destination item.
    Merge {
        /// Namespace.
        namespace: String,
        /// Destination item key.
        destination: String,
        /// Sources as `label=key`.
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Print records as `label<TAB>key<TAB>hex` lines.
    Export {
        /// Namespace.
        namespace: String,
        /// Entries as `label=key`.
        #[arg(required = true)]
        entries: Vec<String>,
        /// Reference timestamp for the remaining TTL (default: now).
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Import `export` lines from stdin.
    Import {
        /// Namespace.
        namespace: String,
        /// Reference timestamp the blobs' TTLs count from (default: now).
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Delete every record and bucket of the given labels.
    Flush {
        /// Namespace, or `*` for all.
        namespace: String,
        /// Labels to flush.
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Show a stored record.
    Inspect {
        /// Namespace.
        namespace: String,
        /// Label.
        label: String,
        /// Item key.
        key: String,
    },
}

fn parse_log_format(value: &str) -> std::result::Result<LogFormat, String> {
    value.parse()
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let mut logging = LoggingConfig::from_env(args.verbose);
    if let Some(format) = args.log_format {
        logging = logging.with_format(format);
    }
    if let Err(e) = observability::init_logging(&logging) {
        eprintln!("warning: {e}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn features(text: &[String], tokens: &[String]) -> Result<Vec<FeatureArg>> {
    let text = text.iter().map(|arg| cli::parse_feature(arg, false));
    let tokens = tokens.iter().map(|arg| cli::parse_feature(arg, true));
    Ok(text.chain(tokens).collect::<simidx::Result<_>>()?)
}

fn entries(args: &[String]) -> Result<Vec<(String, String)>> {
    Ok(args
        .iter()
        .map(|arg| cli::parse_entry(arg))
        .collect::<simidx::Result<_>>()?)
}

fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SimidxConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimidxConfig::load_default(),
    };
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }

    let redis = RedisStore::from_settings(&config.redis).context("opening Redis store")?;
    let store = ResilientStore::new(redis, config.resilience.clone(), "redis");
    let index = MinHashIndex::new(config.index, store)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Record {
            namespace,
            key,
            features: text,
            tokens,
        } => cli::record(&index, &namespace, &key, &features(&text, &tokens)?, &mut out),
        Commands::Compare {
            namespace,
            key,
            labels,
            limit,
        } => {
            let labels = labels
                .iter()
                .map(|arg| cli::parse_threshold(arg))
                .collect::<simidx::Result<Vec<_>>>()?;
            cli::compare(&index, &namespace, &key, &labels, limit, &mut out)
        },
        Commands::Classify {
            namespace,
            features: text,
            tokens,
            limit,
        } => cli::classify(&index, &namespace, &features(&text, &tokens)?, limit, &mut out),
        Commands::Delete {
            namespace,
            entries: items,
        } => cli::delete(&index, &namespace, &entries(&items)?, &mut out),
        Commands::Merge {
            namespace,
            destination,
            sources,
        } => cli::merge(&index, &namespace, &destination, &entries(&sources)?, &mut out),
        Commands::Export {
            namespace,
            entries: items,
            timestamp,
        } => {
            let timestamp = timestamp.unwrap_or_else(current_timestamp);
            cli::export(&index, &namespace, &entries(&items)?, timestamp, &mut out)
        },
        Commands::Import {
            namespace,
            timestamp,
        } => {
            let timestamp = timestamp.unwrap_or_else(current_timestamp);
            let count = cli::import(&index, &namespace, io::stdin().lock(), timestamp)?;
            eprintln!("imported {count} entries");
            Ok(())
        },
        Commands::Flush { namespace, labels } => cli::flush(&index, &namespace, &labels, &mut out),
        Commands::Inspect {
            namespace,
            label,
            key,
        } => cli::inspect(&index, &namespace, &label, &key, &mut out),
    }
}
