//! Feature input for signature building.

use std::collections::BTreeSet;

/// A feature fed to the signature builder.
///
/// Both variants normalize to a set of tokens before hashing:
///
/// | Variant | Tokens |
/// |---------|--------|
/// | `Text` | Every character of the string (Unicode scalar values) |
/// | `Tokens` | Every string in the list, taken whole |
///
/// A feature with no tokens is *absent*: it produces no signature and
/// contributes nothing to an index.
///
/// # Example
///
/// ```rust
/// use simidx::Feature;
///
/// let text = Feature::text("aab");
/// assert_eq!(text.token_set().len(), 2);
///
/// let bag = Feature::tokens(["foo", "bar", "foo"]);
/// assert_eq!(bag.token_set().len(), 2);
///
/// assert!(Feature::text("").is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Free text, tokenized into characters.
    Text(String),
    /// A bag of whole tokens.
    Tokens(Vec<String>),
}

impl Feature {
    /// Creates a text feature.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a token-bag feature.
    #[must_use]
    pub fn tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    /// Returns true if the feature has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Tokens(tokens) => tokens.is_empty(),
        }
    }

    /// Returns the normalized token set.
    ///
    /// Ordering is lexicographic so that callers iterating the set see the
    /// same sequence on every run.
    #[must_use]
    pub fn token_set(&self) -> BTreeSet<String> {
        match self {
            Self::Text(text) => text.chars().map(String::from).collect(),
            Self::Tokens(tokens) => tokens.iter().cloned().collect(),
        }
    }
}

impl From<&str> for Feature {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Feature {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for Feature {
    fn from(tokens: Vec<String>) -> Self {
        Self::Tokens(tokens)
    }
}

impl From<Vec<&str>> for Feature {
    fn from(tokens: Vec<&str>) -> Self {
        Self::tokens(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_tokenizes_characters() {
        let tokens = Feature::text("hello").token_set();
        let expected: BTreeSet<String> = ["h", "e", "l", "o"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_text_handles_multibyte_characters() {
        let tokens = Feature::text("数据库").token_set();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.contains("据"));
    }

    #[test]
    fn test_tokens_are_taken_whole() {
        let tokens = Feature::tokens(["hello world", "pizza"]).token_set();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("hello world"));
    }

    #[test]
    fn test_empty_features() {
        assert!(Feature::text("").is_empty());
        assert!(Feature::tokens(Vec::<String>::new()).is_empty());
        assert!(!Feature::tokens([""]).is_empty());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Feature::from("abc"), Feature::Text("abc".to_string()));
        assert_eq!(
            Feature::from(vec!["a", "b"]),
            Feature::Tokens(vec!["a".to_string(), "b".to_string()])
        );
    }
}
