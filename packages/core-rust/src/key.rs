//! Case-insensitive names for modes, operations, products and properties.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

/// A name that compares and hashes without regard to ASCII/Unicode case
/// while remembering the spelling it was created with.
///
/// `"Blur"`, `"blur"` and `"BLUR"` are the same key; [`CaselessKey::name`]
/// returns whichever spelling was first used to build the key.
#[derive(Clone)]
pub struct CaselessKey {
    name: String,
    folded: String,
}

impl CaselessKey {
    /// Creates a key from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let folded = name.to_lowercase();
        Self { name, folded }
    }

    /// The original spelling.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The case-folded form used for comparison.
    #[must_use]
    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Returns `true` if the key is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
    }

    /// Compares against a plain string without allocating a key.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.folded == other.to_lowercase()
    }
}

impl PartialEq for CaselessKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for CaselessKey {}

impl Hash for CaselessKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for CaselessKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CaselessKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Debug for CaselessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, f)
    }
}

impl fmt::Display for CaselessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for CaselessKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for CaselessKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&String> for CaselessKey {
    fn from(name: &String) -> Self {
        Self::new(name.as_str())
    }
}

impl Serialize for CaselessKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn keys_differing_in_case_are_equal() {
        assert_eq!(CaselessKey::new("Blur"), CaselessKey::new("bLUR"));
        assert_ne!(CaselessKey::new("Blur"), CaselessKey::new("Blurs"));
    }

    #[test]
    fn original_spelling_is_preserved() {
        let key = CaselessKey::new("GaussianBlur");
        assert_eq!(key.name(), "GaussianBlur");
        assert_eq!(key.folded(), "gaussianblur");
        assert_eq!(key.to_string(), "GaussianBlur");
    }

    #[test]
    fn hash_set_deduplicates_case_variants() {
        let mut set = HashSet::new();
        set.insert(CaselessKey::new("rendered"));
        set.insert(CaselessKey::new("RENDERED"));
        set.insert(CaselessKey::new("Rendered"));
        assert_eq!(set.len(), 1);
        for spelling in ["rendered", "Rendered", "RENDERED"] {
            assert!(set.contains(&CaselessKey::new(spelling)));
        }
    }

    #[test]
    fn blank_detection() {
        assert!(CaselessKey::new("").is_blank());
        assert!(CaselessKey::new("   ").is_blank());
        assert!(!CaselessKey::new("com.vendor").is_blank());
    }

    #[test]
    fn matches_plain_str() {
        assert!(CaselessKey::new("TileDecoder").matches("tiledecoder"));
        assert!(!CaselessKey::new("TileDecoder").matches("tileEncoder"));
    }

    #[test]
    fn serializes_as_original_spelling() {
        let json = serde_json::to_string(&CaselessKey::new("Blur")).unwrap();
        assert_eq!(json, "\"Blur\"");
    }
}
