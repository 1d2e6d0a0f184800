//! CLI command implementations.
//!
//! Each command runs against a [`MinHashIndex`] and writes its results to the
//! given writer, so commands are testable with an in-memory store.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `record` | Record features for an item |
//! | `compare` | Rank items similar to a recorded item |
//! | `classify` | Rank items similar to ad-hoc features |
//! | `delete` | Delete records and their bucket memberships |
//! | `merge` | Union source records into a destination |
//! | `export` | Print records as hex blobs |
//! | `import` | Read hex blobs from stdin |
//! | `flush` | Drop whole labels |
//! | `inspect` | Show a stored record |
//!
//! # Example Usage
//!
//! ```bash
//! simidx record events 1 --feature message="connection reset by peer"
//! simidx compare events 1 --label message:8
//! simidx export events message=1 > blobs.tsv
//! simidx import events < blobs.tsv
//! simidx flush '*' message
//! ```

// Allow print_stdout/stderr in CLI module (consistent with main.rs)
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

mod parse;

pub use parse::{
    FeatureArg, format_blob_line, format_match, parse_blob_line, parse_entry, parse_feature,
    parse_threshold,
};

use crate::models::Feature;
use crate::similarity::MinHashIndex;
use crate::storage::SignatureStore;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};

fn as_pairs(entries: &[(String, String)]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .map(|(label, key)| (label.as_str(), key.as_str()))
        .collect()
}

/// Records features for one item.
///
/// # Errors
///
/// Returns an error if the index rejects the write or output fails.
pub fn record<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    key: &str,
    features: &[FeatureArg],
    out: &mut impl Write,
) -> Result<()> {
    let pairs: Vec<(&str, Feature)> = features
        .iter()
        .map(|arg| (arg.label.as_str(), arg.feature.clone()))
        .collect();
    index
        .record(namespace, key, &pairs)
        .with_context(|| format!("recording '{key}'"))?;
    writeln!(out, "recorded {key} ({} features)", pairs.len())?;
    Ok(())
}

/// Prints items similar to a recorded item.
///
/// # Errors
///
/// Returns an error if the query or output fails.
pub fn compare<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    key: &str,
    labels: &[(String, usize)],
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<()> {
    let labels: Vec<(&str, usize)> = labels.iter().map(|(l, t)| (l.as_str(), *t)).collect();
    for result in index.compare(namespace, key, &labels, limit)? {
        writeln!(out, "{}", format_match(&result))?;
    }
    Ok(())
}

/// Prints items similar to ad-hoc features.
///
/// # Errors
///
/// Returns an error if the query or output fails.
pub fn classify<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    features: &[FeatureArg],
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<()> {
    let queries: Vec<(&str, usize, Feature)> = features
        .iter()
        .map(|arg| (arg.label.as_str(), arg.threshold, arg.feature.clone()))
        .collect();
    for result in index.classify(namespace, &queries, limit)? {
        writeln!(out, "{}", format_match(&result))?;
    }
    Ok(())
}

/// Deletes `label=key` entries.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    entries: &[(String, String)],
    out: &mut impl Write,
) -> Result<()> {
    index.delete(namespace, &as_pairs(entries))?;
    writeln!(out, "deleted {} entries", entries.len())?;
    Ok(())
}

/// Merges `label=source` entries into `destination`.
///
/// # Errors
///
/// Returns an error if the merge fails.
pub fn merge<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    destination: &str,
    sources: &[(String, String)],
    out: &mut impl Write,
) -> Result<()> {
    index.merge(namespace, destination, &as_pairs(sources))?;
    writeln!(out, "merged {} sources into {destination}", sources.len())?;
    Ok(())
}

/// Prints one `label<TAB>key<TAB>hex` line per entry.
///
/// # Errors
///
/// Returns an error if the export or output fails.
pub fn export<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    entries: &[(String, String)],
    timestamp: u64,
    out: &mut impl Write,
) -> Result<()> {
    let blobs = index.export(namespace, &as_pairs(entries), timestamp)?;
    for ((label, key), blob) in entries.iter().zip(blobs) {
        writeln!(out, "{}", format_blob_line(label, key, &blob))?;
    }
    Ok(())
}

/// Imports `label<TAB>key<TAB>hex` lines. Blank lines are skipped.
///
/// Returns the number of lines read.
///
/// # Errors
///
/// Returns an error naming the first malformed line; nothing is imported then.
pub fn import<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    input: impl BufRead,
    timestamp: u64,
) -> Result<usize> {
    let mut parsed = Vec::new();
    for (number, line) in input.lines().enumerate() {
        let line = line.context("reading import input")?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = parse_blob_line(&line).with_context(|| format!("line {}", number + 1))?;
        parsed.push(entry);
    }

    let entries: Vec<(&str, &str, &[u8])> = parsed
        .iter()
        .map(|(label, key, blob)| (label.as_str(), key.as_str(), blob.as_slice()))
        .collect();
    index.import(namespace, &entries, timestamp)?;
    Ok(entries.len())
}

/// Flushes labels in a namespace (or `*`).
///
/// # Errors
///
/// Returns an error if the deletion fails.
pub fn flush<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    labels: &[String],
    out: &mut impl Write,
) -> Result<()> {
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    let removed = index.flush(namespace, &labels)?;
    writeln!(out, "removed {removed} keys")?;
    Ok(())
}

/// Prints a stored record.
///
/// # Errors
///
/// Returns an error if the record does not exist.
pub fn inspect<S: SignatureStore>(
    index: &MinHashIndex<S>,
    namespace: &str,
    label: &str,
    key: &str,
    out: &mut impl Write,
) -> Result<()> {
    let record = index
        .lookup(namespace, label, key)?
        .ok_or_else(|| crate::Error::NotFound {
            label: label.to_string(),
            key: key.to_string(),
        })?;
    let now = index.store().now();
    writeln!(out, "version:    {}", record.version)?;
    writeln!(out, "expires_at: {}", record.expires_at)?;
    writeln!(out, "ttl:        {}", record.remaining_ttl(now))?;
    writeln!(out, "signature:  {}", record.signature)?;
    Ok(())
}
