// 🔑 Key Builder - (person, organization) → canonical identity
//
// Two records with equal CanonicalKey are the same real-world entity.
// Legacy composite keys arrive as "name@@org" or "name|org".

use crate::normalizer::{normalize, Normalizer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Delimiter used when a key is persisted as a single string
pub const KEY_DELIMITER: &str = "@@";

/// Older cache files joined the two components with a pipe
pub const LEGACY_KEY_DELIMITER: &str = "|";

// ============================================================================
// CANONICAL KEY
// ============================================================================

/// Normalized `(person, org)` pair. `org` is empty when the organization is
/// unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey {
    person: String,
    org: String,
}

impl CanonicalKey {
    pub fn person(&self) -> &str {
        &self.person
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn has_org(&self) -> bool {
        !self.org.is_empty()
    }

    /// Same person, organization replaced (already normalized by construction)
    pub fn with_org_of(&self, other: &CanonicalKey) -> CanonicalKey {
        CanonicalKey {
            person: self.person.clone(),
            org: other.org.clone(),
        }
    }

    /// Same person, organization unknown
    pub fn person_only(&self) -> CanonicalKey {
        CanonicalKey {
            person: self.person.clone(),
            org: String::new(),
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.person, KEY_DELIMITER, self.org)
    }
}

impl Serialize for CanonicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CanonicalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let composite = String::deserialize(deserializer)?;
        Ok(parse_key(&composite))
    }
}

// ============================================================================
// KEY BUILDER
// ============================================================================

/// Builds keys with a specific normalizer (custom alias table)
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    normalizer: Normalizer,
}

impl KeyBuilder {
    pub fn new(normalizer: Normalizer) -> Self {
        KeyBuilder { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalize each component independently
    pub fn build(&self, person_raw: &str, org_raw: &str) -> CanonicalKey {
        CanonicalKey {
            person: self.normalizer.normalize(person_raw),
            org: self.normalizer.normalize(org_raw),
        }
    }

    /// Split a pre-composed key and normalize both halves
    pub fn parse(&self, composite: &str) -> CanonicalKey {
        let (person, org) = split_composite(composite);
        self.build(person, org)
    }
}

/// Build a key with the built-in alias table
pub fn build_key(person_raw: &str, org_raw: &str) -> CanonicalKey {
    CanonicalKey {
        person: normalize(person_raw),
        org: normalize(org_raw),
    }
}

/// Parse a composite key with the built-in alias table
pub fn parse_key(composite: &str) -> CanonicalKey {
    let (person, org) = split_composite(composite);
    build_key(person, org)
}

/// Split on the first "@@" if present, otherwise on the first "|";
/// no delimiter means the organization is unknown.
fn split_composite(composite: &str) -> (&str, &str) {
    composite
        .split_once(KEY_DELIMITER)
        .or_else(|| composite.split_once(LEGACY_KEY_DELIMITER))
        .unwrap_or((composite, ""))
}

// ============================================================================
// TESTS
// ============================================================================
