// 🎯 Fuzzy Name Matching - Disambiguation aid for free-typed queries
//
// "Zalewsky" → "Nicola Zalewski" when nothing matches exactly.
// Never used by the merge path: canonical keys are exact by contract.

use crate::normalizer::Normalizer;
use std::collections::HashSet;
use strsim::normalized_levenshtein;

/// Minimum similarity accepted by default
pub const DEFAULT_THRESHOLD: f64 = 0.82;

#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch<'a> {
    pub candidate: &'a str,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct NameMatcher {
    threshold: f64,
    normalizer: Normalizer,
}

impl NameMatcher {
    /// `threshold` is clamped to [0, 1]
    pub fn new(threshold: f64) -> Self {
        NameMatcher {
            threshold: threshold.clamp(0.0, 1.0),
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Similarity in [0, 1] of the normalized forms: the better of edit
    /// similarity and token overlap (so word order does not matter).
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = self.normalizer.normalize(a);
        let b = self.normalizer.normalize(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        normalized_levenshtein(&a, &b).max(token_overlap(&a, &b))
    }

    /// Best candidate at or above the threshold; on equal scores the earlier
    /// candidate wins.
    pub fn best_match<'a, I>(&self, query: &str, candidates: I) -> Option<NameMatch<'a>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<NameMatch<'a>> = None;

        for candidate in candidates {
            let score = self.similarity(query, candidate);
            if score < self.threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(NameMatch { candidate, score });
            }
        }

        best
    }
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Jaccard index of whitespace tokens
fn token_overlap(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

// ============================================================================
// TESTS
// ============================================================================
