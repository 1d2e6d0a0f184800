//! Key layout shared by every store.
//!
//! | Kind | Key |
//! |------|-----|
//! | Record | `{prefix}:{namespace}:{label}:s:{item}` |
//! | Bucket | `{prefix}:{namespace}:{label}:b:{band}:{band_key}` |
//!
//! Caller-supplied segments are escaped (`%` → `%25`, `:` → `%3A`) so a
//! namespace or label can never spill into a neighbouring segment.

use crate::{Error, Result};
use regex::Regex;
use std::borrow::Cow;

/// Builds store keys under a common prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Creates a key space.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the signature record for an item.
    #[must_use]
    pub fn record_key(&self, namespace: &str, label: &str, item: &str) -> String {
        format!(
            "{}:{}:{}:s:{}",
            escape(&self.prefix),
            escape(namespace),
            escape(label),
            escape(item)
        )
    }

    /// Key of the bucket for one band key.
    #[must_use]
    pub fn bucket_key(&self, namespace: &str, label: &str, band: usize, band_key: &str) -> String {
        format!(
            "{}:{}:{}:b:{band}:{}",
            escape(&self.prefix),
            escape(namespace),
            escape(label),
            escape(band_key)
        )
    }

    /// Pattern covering every record and bucket of a label.
    ///
    /// `namespace = None` spans all namespaces.
    #[must_use]
    pub fn label_scope(&self, namespace: Option<&str>, label: &str) -> KeyPattern {
        KeyPattern {
            segments: vec![
                Some(escape(&self.prefix).into_owned()),
                namespace.map(|ns| escape(ns).into_owned()),
                Some(escape(label).into_owned()),
            ],
        }
    }
}

/// A key pattern: fixed leading segments, each literal or a single-segment
/// wildcard, followed by any remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    segments: Vec<Option<String>>,
}

impl KeyPattern {
    /// Renders a Redis `SCAN MATCH` glob.
    ///
    /// A glob `*` can cross segment boundaries, so callers must re-check
    /// scanned keys with [`KeyPattern::matches`].
    #[must_use]
    pub fn to_glob(&self) -> String {
        let mut glob = String::new();
        for segment in &self.segments {
            match segment {
                Some(literal) => glob.push_str(&escape_glob(literal)),
                None => glob.push('*'),
            }
            glob.push(':');
        }
        glob.push('*');
        glob
    }

    /// Compiles the exact matcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the regex cannot be compiled.
    pub fn to_regex(&self) -> Result<Regex> {
        let mut source = String::from("^");
        for segment in &self.segments {
            match segment {
                Some(literal) => source.push_str(&regex::escape(literal)),
                None => source.push_str("[^:]*"),
            }
            source.push(':');
        }
        Regex::new(&source).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    /// Returns true if `key` falls inside the pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        let mut rest = key;
        for segment in &self.segments {
            let Some((head, tail)) = rest.split_once(':') else {
                return false;
            };
            if let Some(literal) = segment {
                if head != literal {
                    return false;
                }
            }
            rest = tail;
        }
        true
    }
}

/// Escapes a caller-supplied key segment.
fn escape(segment: &str) -> Cow<'_, str> {
    if segment.contains(['%', ':']) {
        Cow::Owned(segment.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Escapes Redis glob metacharacters.
fn escape_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
