// 💾 Reconciliation Cache - CanonicalKey → birth year, persisted between runs
//
// File format (JSON object, keys sorted on write):
//   { "nicola zalewski@@roma": 2002, "yunus musah@@atalanta": {"birth_year": 2002} }
//
// Years may also be stored as numeric strings ("2002") or whole floats
// (2002.0) by older writers.
//
// Loaded fully into memory on open. Every put() rewrites the whole file
// (write-through) so an interrupted batch loses at most the entry in flight.
// Single writer only: no locking against other processes.

use crate::birth_year::{parse_structured, YearBounds};
use crate::key::{CanonicalKey, KeyBuilder};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Year held by a stored value: integer, whole float, numeric string, or any
/// of those wrapped as `{"birth_year": ..}`. Plausibility is checked by the
/// reader (`lookup`, `clean`), not here.
fn stored_year(value: &Value) -> Option<i32> {
    let raw = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64),
        },
        Value::String(s) => parse_structured(s),
        Value::Object(map) => match map.get("birth_year") {
            Some(inner) if !inner.is_object() => return stored_year(inner),
            _ => None,
        },
        _ => None,
    };
    raw.and_then(|y| i32::try_from(y).ok())
}

/// Load-time statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Entries whose stored key was not already in canonical form
    pub rekeyed: usize,

    /// Entries with a value that is not a year
    pub unreadable: usize,

    /// Entries whose key collided with an earlier entry after re-normalization
    pub collisions: usize,
}

/// Result of `ReconciliationCache::clean`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub kept: usize,
    pub dropped: usize,
    pub rekeyed: usize,
}

#[derive(Debug)]
pub struct ReconciliationCache {
    path: PathBuf,
    entries: BTreeMap<CanonicalKey, i32>,
    stats: LoadStats,
}

impl ReconciliationCache {
    /// Open with the built-in alias table. A missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, &KeyBuilder::default())
    }

    /// Open, re-normalizing stored keys with `keys`
    pub fn open_with(path: impl Into<PathBuf>, keys: &KeyBuilder) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(path = %path.display(), "cache file not found, starting empty");
            return Ok(ReconciliationCache {
                path,
                entries: BTreeMap::new(),
                stats: LoadStats::default(),
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;

        let raw: BTreeMap<String, Value> = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Cache file is not a JSON object: {}", path.display()))?
        };

        let mut entries = BTreeMap::new();
        let mut stats = LoadStats::default();

        for (stored_key, value) in raw {
            let Some(year) = stored_year(&value) else {
                stats.unreadable += 1;
                continue;
            };

            let key = keys.parse(&stored_key);
            if key.to_string() != stored_key {
                stats.rekeyed += 1;
            }
            if entries.contains_key(&key) {
                stats.collisions += 1;
                continue;
            }
            entries.insert(key, year);
        }

        if stats.unreadable > 0 || stats.collisions > 0 {
            warn!(
                path = %path.display(),
                unreadable = stats.unreadable,
                collisions = stats.collisions,
                "cache entries skipped on load"
            );
        }
        info!(path = %path.display(), entries = entries.len(), "cache loaded");

        Ok(ReconciliationCache {
            path,
            entries,
            stats,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write subsequent flushes to a different file
    pub fn retarget(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    pub fn load_stats(&self) -> LoadStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Absent keys are `None`, never an error
    pub fn get(&self, key: &CanonicalKey) -> Option<i32> {
        self.entries.get(key).copied()
    }

    /// Plausible cached year for `key`: the exact entry first, then the
    /// person-only one. Implausible stored years read as absent.
    pub fn lookup(&self, key: &CanonicalKey, bounds: &YearBounds) -> Option<i32> {
        self.get(key)
            .or_else(|| self.get(&key.person_only()))
            .and_then(|year| bounds.validate(i64::from(year)))
    }

    /// Store and flush immediately. An unchanged value does not touch disk.
    pub fn put(&mut self, key: CanonicalKey, birth_year: i32) -> Result<()> {
        if self.entries.get(&key) == Some(&birth_year) {
            return Ok(());
        }
        debug!(key = %key, year = birth_year, "cache put");
        self.entries.insert(key, birth_year);
        self.flush()
    }

    /// Add entries for keys not cached yet, with a single flush. Existing
    /// entries are left as they are. Returns how many were added.
    pub fn append_all<I>(&mut self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (CanonicalKey, i32)>,
    {
        let mut added = 0;
        for (key, year) in pairs {
            if let Entry::Vacant(slot) = self.entries.entry(key) {
                slot.insert(year);
                added += 1;
            }
        }
        if added > 0 {
            self.flush()?;
        }
        Ok(added)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalKey, i32)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Rewrite the whole file (temp file + rename)
    pub fn flush(&self) -> Result<()> {
        let map: BTreeMap<String, i32> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let json = serde_json::to_string_pretty(&map).context("Failed to serialize cache")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;

        Ok(())
    }

    /// Drop entries that fail `bounds` and rewrite the file with canonical
    /// `person@@org` keys (legacy keys were already re-normalized on load).
    pub fn clean(&mut self, bounds: &YearBounds) -> Result<CleanReport> {
        let before = self.entries.len();
        self.entries
            .retain(|_, year| bounds.validate(i64::from(*year)).is_some());

        let report = CleanReport {
            kept: self.entries.len(),
            dropped: before - self.entries.len() + self.stats.unreadable + self.stats.collisions,
            rekeyed: self.stats.rekeyed,
        };

        self.flush()?;
        self.stats = LoadStats::default();

        info!(
            kept = report.kept,
            dropped = report.dropped,
            rekeyed = report.rekeyed,
            "cache cleaned"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = TempDir::new().unwrap();
        let cache = ReconciliationCache::open(dir.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&build_key("Yunus Musah", "Atalanta")), None);
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("age_cache.json");
        let key = build_key("Yunus Musah", "Atalanta");

        let mut cache = ReconciliationCache::open(&path).unwrap();
        cache.put(key.clone(), 2002).unwrap();

        let reloaded = ReconciliationCache::open(&path).unwrap();
        assert_eq!(reloaded.get(&key), Some(2002));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_put_is_write_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = ReconciliationCache::open(&path).unwrap();
        cache.put(build_key("Nicola Zalewski", ""), 2002).unwrap();

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"nicola zalewski@@\": 2002"));
    }

    #[test]
    fn test_accepts_wrapped_values_and_legacy_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "Yunus Musah|Atalanta BC": 2002,
                "nicola zalewski@@roma": {"birth_year": 2002},
                "broken@@x": "n/a",
                "empty@@x": {"birth_year": null}
            }"#,
        )
        .unwrap();

        let cache = ReconciliationCache::open(&path).unwrap();
        assert_eq!(cache.get(&build_key("yunus musah", "atalanta")), Some(2002));
        assert_eq!(cache.get(&build_key("Nicola Zalewski", "Roma")), Some(2002));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.load_stats().unreadable, 2);
        assert_eq!(cache.load_stats().rekeyed, 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "[1, 2, 3").unwrap();

        assert!(ReconciliationCache::open(&path).is_err());
    }

    #[test]
    fn test_clean_drops_implausible_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "Yunus Musah|Atalanta": 2002,
                "kid@@primavera": 2015,
                "old@@genoa": 1850,
                "nicola zalewski@@roma": 2002
            }"#,
        )
        .unwrap();

        let mut cache = ReconciliationCache::open(&path).unwrap();
        let report = cache.clean(&YearBounds::new(2025)).unwrap();

        assert_eq!(report, CleanReport { kept: 2, dropped: 2, rekeyed: 1 });

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("yunus musah@@atalanta"));
        assert!(!on_disk.contains('|'));
        assert!(!on_disk.contains("kid@@primavera"));
    }

    #[test]
    fn test_append_all_keeps_existing_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ReconciliationCache::open(&path).unwrap();
        let added = cache
            .append_all(vec![
                (build_key("A", "x"), 2000),
                (build_key("B", "y"), 2001),
            ])
            .unwrap();
        assert_eq!(added, 2);

        let added = cache
            .append_all(vec![(build_key("A", "x"), 1999), (build_key("C", "z"), 2003)])
            .unwrap();
        assert_eq!(added, 1);

        let reloaded = ReconciliationCache::open(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get(&build_key("A", "x")), Some(2000));
    }

    #[test]
    fn test_numeric_strings_and_whole_floats_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "yunus musah@@atalanta": "2002",
                "nicola zalewski@@inter": 2002.0,
                "marco rossi@@genoa": {"birth_year": "1990"},
                "half@@x": 2002.5
            }"#,
        )
        .unwrap();

        let mut cache = ReconciliationCache::open(&path).unwrap();
        assert_eq!(cache.get(&build_key("Yunus Musah", "Atalanta")), Some(2002));
        assert_eq!(cache.get(&build_key("Nicola Zalewski", "Inter")), Some(2002));
        assert_eq!(cache.get(&build_key("Marco Rossi", "Genoa")), Some(1990));
        assert_eq!(cache.load_stats().unreadable, 1);

        // cleaning keeps them and rewrites them as plain integers
        let report = cache.clean(&YearBounds::new(2025)).unwrap();
        assert_eq!(report.kept, 3);
        assert_eq!(report.dropped, 1);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"yunus musah@@atalanta\": 2002"));
        assert!(on_disk.contains("\"nicola zalewski@@inter\": 2002"));
    }

    #[test]
    fn test_lookup_falls_back_to_person_only() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReconciliationCache::open(dir.path().join("cache.json")).unwrap();
        cache.put(build_key("Nicola Zalewski", ""), 2002).unwrap();
        cache.put(build_key("Kid Prodigy", "Primavera"), 2015).unwrap();

        let bounds = YearBounds::new(2025);
        assert_eq!(cache.lookup(&build_key("Nicola Zalewski", "Inter"), &bounds), Some(2002));
        assert_eq!(cache.lookup(&build_key("Kid Prodigy", "Primavera"), &bounds), None);
        assert_eq!(cache.lookup(&build_key("Marco Rossi", "Genoa"), &bounds), None);
    }

    #[test]
    fn test_unwritable_cache_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();

        let mut cache = ReconciliationCache::open(blocker.join("cache.json")).unwrap();
        assert!(cache.put(build_key("Yunus Musah", "Atalanta"), 2002).is_err());
    }
}
