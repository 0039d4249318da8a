use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An ordered (source, target) language pair. Equality and hashing are
/// case-insensitive; the codes are stored lowercased at construction so
/// comparisons stay cheap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LanguagePair {
    source: String,
    target: String,
}

impl LanguagePair {
    #[must_use]
    pub fn new(source: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        Self {
            source: source.as_ref().to_ascii_lowercase(),
            target: target.as_ref().to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn as_key(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }

    /// Parses a `"src->tgt"` string, the format used by
    /// `translation.engine_mapping` and chain configuration.
    pub fn parse(s: &str) -> Option<Self> {
        let (src, tgt) = s.split_once("->")?;
        let src = src.trim();
        let tgt = tgt.trim();
        if src.is_empty() || tgt.is_empty() {
            return None;
        }
        Some(Self::new(src, tgt))
    }
}

impl PartialEq for LanguagePair {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}
impl Eq for LanguagePair {}

impl Hash for LanguagePair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(LanguagePair::new("EN", "De"), LanguagePair::new("en", "de"));
    }

    #[test]
    fn parse_roundtrips_as_key() {
        let p = LanguagePair::parse("ja->en").unwrap();
        assert_eq!(p.as_key(), "ja->en");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(LanguagePair::parse("ja-en").is_none());
        assert!(LanguagePair::parse("->en").is_none());
    }
}
