// 🔤 Text Normalizer - Free-form names → stable lookup form
//
// "Atalanta B.C.", "ATALANTA", "atalanta bc" → "atalanta"
// "AS Roma", "A.S. Roma" → "roma"
// "Nicolò Zaniolo" → "nicolo zaniolo"
//
// Pipeline (in order): strip diacritics, lowercase, drop legal/club tokens at
// word boundaries, periods/hyphens → spaces, drop remaining punctuation,
// collapse whitespace, exact-match alias substitution.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// CLUB / LEGAL TOKENS
// ============================================================================

/// Organizational prefixes/suffixes and founding years carried by club names.
/// Only whole words are removed: "calcio" goes, "calciomercato" stays.
static ORG_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:f\.?c\.?|a\.?c\.?|b\.?c\.?|u\.?s\.?|ssd|ss|ssc|ud|spa|calcio|club|1905|1907|1909|1913|1919|1927)\b",
    )
    .expect("static regex")
});

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("static regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Known equivalent spellings of the same organization, as they appear in
/// source feeds. Both sides are cleaned on load; pairs the token rules
/// already fold together ("SS Lazio" → "lazio") drop out there.
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("juventus fc", "juventus"),
    ("juve", "juventus"),
    ("internazionale", "inter"),
    ("inter milano", "inter"),
    ("internazionale milano", "inter"),
    ("ac milan", "milan"),
    ("ssc napoli", "napoli"),
    ("ss lazio", "lazio"),
    ("as roma", "roma"),
    ("a.s. roma", "roma"),
    ("atalanta bc", "atalanta"),
    ("bologna fc", "bologna"),
    ("udinese calcio", "udinese"),
    ("acf fiorentina", "fiorentina"),
    ("torino fc", "torino"),
    ("hellas verona", "verona"),
    ("genoa cfc", "genoa"),
    ("venezia fc", "venezia"),
    ("como 1907", "como"),
    ("pisa sc", "pisa"),
    ("pisa sporting club", "pisa"),
    ("football club torinese", "torino"),
    ("unione sportiva internazionale napoli", "napoli"),
    ("alba roma 1907", "roma"),
];

/// Alias table: cleaned spelling → canonical spelling (both sides cleaned).
///
/// Chains are resolved on insert, so every target is final: no target is
/// itself an alias.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// Empty table (no substitutions)
    pub fn empty() -> Self {
        AliasTable {
            aliases: HashMap::new(),
        }
    }

    /// Table pre-loaded with the built-in club aliases
    pub fn with_defaults() -> Self {
        let mut table = AliasTable::empty();
        for (alias, canonical) in DEFAULT_ALIASES {
            table.insert(alias, canonical);
        }
        table
    }

    /// Register an alias. Both sides are cleaned first; entries that clean to
    /// an empty string or to the same string are ignored. A canonical that is
    /// already an alias is followed to its target, and aliases pointing at
    /// the new alias are redirected, so "a → b" plus "b → c" maps both to "c".
    /// A pair that would close a cycle is ignored.
    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let alias = clean(alias);
        let canonical = clean(canonical);
        if alias.is_empty() || canonical.is_empty() {
            return;
        }

        let canonical = self.aliases.get(&canonical).cloned().unwrap_or(canonical);
        if alias == canonical {
            return;
        }

        for target in self.aliases.values_mut() {
            if *target == alias {
                *target = canonical.clone();
            }
        }
        self.aliases.insert(alias, canonical);
    }

    /// Merge extra pairs (e.g. from configuration) over this table
    pub fn extend<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (alias, canonical) in pairs {
            self.insert(alias, canonical);
        }
    }

    pub fn lookup(&self, cleaned: &str) -> Option<&str> {
        self.aliases.get(cleaned).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    aliases: AliasTable,
}

impl Normalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Normalizer { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Canonicalize a free-form name or organization string.
    ///
    /// Deterministic and idempotent: `normalize(normalize(x)) == normalize(x)`.
    /// Empty or all-whitespace input yields the empty string.
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean(raw);
        match self.aliases.lookup(&cleaned) {
            Some(canonical) => canonical.to_string(),
            None => cleaned,
        }
    }
}

/// Normalize with the built-in alias table
pub fn normalize(raw: &str) -> String {
    static DEFAULT: Lazy<Normalizer> = Lazy::new(Normalizer::default);
    DEFAULT.normalize(raw)
}

/// Steps 1-6 (everything except alias substitution), repeated until stable:
/// one pass can expose a new club token ("milan_fc" → "milan fc" → "milan").
/// After the first pass the text is plain ASCII, so later passes can only
/// remove tokens and the loop ends.
fn clean(raw: &str) -> String {
    let mut current = clean_once(raw);
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_once(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let lowered = strip_accents(raw).to_lowercase();
    let without_tokens = ORG_TOKENS.replace_all(&lowered, " ");
    let spaced = without_tokens.replace(['.', '-'], " ");
    let alnum = NON_ALNUM.replace_all(&spaced, " ");

    WHITESPACE.replace_all(&alnum, " ").trim().to_string()
}

/// Unicode-decompose and drop combining marks ("Nicolò" → "Nicolo")
pub fn strip_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

// ============================================================================
// TESTS
// ============================================================================
