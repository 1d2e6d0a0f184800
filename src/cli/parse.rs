//! Argument parsers for the CLI.
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `label=text` | Text feature |
//! | `label:threshold=text` | Text feature queried with a band threshold |
//! | `label:threshold` | Label queried with a band threshold |
//! | `label=key` | Entry (label plus item key) |
//! | `a,b,c` | Token list (with `--tokens`) |

use crate::models::{Feature, SimilarityMatch};
use crate::{Error, Result};

/// A feature argument with its optional threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureArg {
    /// Index label.
    pub label: String,
    /// Band threshold; `0` when none was given.
    pub threshold: usize,
    /// The feature.
    pub feature: Feature,
}

/// Parses `label[:threshold]=value`.
///
/// With `tokens`, the value is a comma-separated token list; otherwise it is text.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the `=` is missing, the label is
/// empty, or the threshold is not a number.
pub fn parse_feature(arg: &str, tokens: bool) -> Result<FeatureArg> {
    let (head, value) = arg
        .split_once('=')
        .ok_or_else(|| Error::InvalidInput(format!("expected label=value, got '{arg}'")))?;
    let (label, threshold) = parse_threshold(head)?;
    let feature = if tokens {
        Feature::tokens(value.split(',').filter(|t| !t.is_empty()))
    } else {
        Feature::text(value)
    };
    Ok(FeatureArg {
        label,
        threshold,
        feature,
    })
}

/// Parses `label[:threshold]`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty label or a bad threshold.
pub fn parse_threshold(arg: &str) -> Result<(String, usize)> {
    let (label, threshold) = match arg.rsplit_once(':') {
        Some((label, threshold)) => {
            let threshold = threshold
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid threshold in '{arg}'")))?;
            (label, threshold)
        },
        None => (arg, 0),
    };
    if label.is_empty() {
        return Err(Error::InvalidInput(format!("missing label in '{arg}'")));
    }
    Ok((label.to_string(), threshold))
}

/// Parses `label=key`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if either side is empty.
pub fn parse_entry(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((label, key)) if !label.is_empty() && !key.is_empty() => {
            Ok((label.to_string(), key.to_string()))
        },
        _ => Err(Error::InvalidInput(format!("expected label=key, got '{arg}'"))),
    }
}

/// Parses one line of `export` output: `label<TAB>key<TAB>hex`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a wrong field count or invalid hex.
pub fn parse_blob_line(line: &str) -> Result<(String, String, Vec<u8>)> {
    let mut fields = line.split('\t');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(label), Some(key), Some(blob), None) if !label.is_empty() && !key.is_empty() => {
            let blob = hex::decode(blob.trim())
                .map_err(|e| Error::InvalidInput(format!("invalid hex for '{key}': {e}")))?;
            Ok((label.to_string(), key.to_string(), blob))
        },
        _ => Err(Error::InvalidInput(format!(
            "expected label<TAB>key<TAB>hex, got '{line}'"
        ))),
    }
}

/// Formats one line of `export` output.
#[must_use]
pub fn format_blob_line(label: &str, key: &str, blob: &[u8]) -> String {
    format!("{label}\t{key}\t{}", hex::encode(blob))
}

/// Formats a match as `key<TAB>score...`, with `-` for missing scores.
#[must_use]
pub fn format_match(result: &SimilarityMatch) -> String {
    let mut line = result.key.clone();
    for score in &result.scores {
        line.push('\t');
        match score {
            Some(score) => line.push_str(&format!("{score:.4}")),
            None => line.push('-'),
        }
    }
    line
}
