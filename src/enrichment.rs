// 🌐 Enrichment - Fill missing birth years from an external collaborator
//
// The collaborator (biography dump, encyclopedic lookup, ...) is reached
// through AttributeResolver. Resolution may run on a bounded worker pool;
// results always come back to the calling thread, which alone validates,
// updates entities and writes the cache (one put per result, so an
// interrupted run keeps everything resolved so far).

use crate::birth_year::{extract_with_bounds, BirthYearInput, YearBounds};
use crate::cache::ReconciliationCache;
use crate::deduplication::CACHE_PROVENANCE;
use crate::key::{CanonicalKey, KeyBuilder};
use crate::record::ResolvedEntity;
use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

// ============================================================================
// RESOLVER CONTRACT
// ============================================================================

/// What a collaborator returned for one (person, org)
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A year-bearing value or biography text
    Found(BirthYearInput),

    /// Nothing known. Also the answer for transient failures.
    NotFound,
}

/// External source of biographical attributes.
///
/// Implementations must not panic or return errors for network trouble:
/// report `NotFound` and log instead.
pub trait AttributeResolver: Send + Sync {
    fn resolve(&self, person: &str, org: &str) -> Resolution;

    /// Name used in provenance trails and logs
    fn name(&self) -> &str {
        "resolver"
    }
}

// ============================================================================
// BIOGRAPHY RESOLVER
// ============================================================================

/// Biographies keyed by `"person@@org"` or bare `"person"`; values are text
/// ("nato il 23 gennaio 2002") or a year.
#[derive(Debug, Clone, Default)]
pub struct BiographyResolver {
    by_key: HashMap<CanonicalKey, BirthYearInput>,
    keys: KeyBuilder,
    label: String,
}

impl BiographyResolver {
    pub fn new(label: &str) -> Self {
        Self::with_keys(label, KeyBuilder::default())
    }

    pub fn with_keys(label: &str, keys: KeyBuilder) -> Self {
        BiographyResolver {
            by_key: HashMap::new(),
            keys,
            label: label.to_string(),
        }
    }

    /// Load a JSON object file. Keys are normalized with `keys`.
    pub fn from_file(path: &Path, keys: &KeyBuilder) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read biography file: {}", path.display()))?;
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("Biography file is not a JSON object: {}", path.display()))?;

        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "biography".to_string());
        let mut resolver = BiographyResolver::with_keys(&label, keys.clone());

        let mut skipped = 0;
        for (key, value) in raw {
            let input = match value {
                serde_json::Value::String(s) => BirthYearInput::Text(s),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => BirthYearInput::Integer(i),
                    None => match n.as_f64() {
                        Some(f) => BirthYearInput::Decimal(f),
                        None => {
                            skipped += 1;
                            continue;
                        }
                    },
                },
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let key = resolver.keys.parse(&key);
            resolver.by_key.insert(key, input);
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "biography entries skipped");
        }
        info!(path = %path.display(), entries = resolver.len(), "biographies loaded");

        Ok(resolver)
    }

    pub fn insert(&mut self, key: CanonicalKey, value: impl Into<BirthYearInput>) {
        self.by_key.insert(key, value.into());
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl AttributeResolver for BiographyResolver {
    /// `person`/`org` are canonical components. Exact key first, then the
    /// person-only entry.
    fn resolve(&self, person: &str, org: &str) -> Resolution {
        let exact = self.keys.build(person, org);
        self.by_key
            .get(&exact)
            .or_else(|| self.by_key.get(&exact.person_only()))
            .cloned()
            .map_or(Resolution::NotFound, Resolution::Found)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Resolver backed by a closure; handy for tests and adapters
pub struct FnResolver<F> {
    label: String,
    resolve: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str, &str) -> Resolution + Send + Sync,
{
    pub fn new(label: &str, resolve: F) -> Self {
        FnResolver {
            label: label.to_string(),
            resolve,
        }
    }
}

impl<F> AttributeResolver for FnResolver<F>
where
    F: Fn(&str, &str) -> Resolution + Send + Sync,
{
    fn resolve(&self, person: &str, org: &str) -> Resolution {
        (self.resolve)(person, org)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

// ============================================================================
// ENRICHMENT RUN
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct EnrichmentOptions {
    /// 1 = serial on the calling thread
    pub workers: usize,

    /// Max resolver calls per run
    pub limit: usize,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        EnrichmentOptions {
            workers: 1,
            limit: 400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Entities without a birth year before enrichment
    pub candidates: usize,

    /// Filled straight from the cache without calling the resolver
    pub from_cache: usize,

    /// Resolver calls made
    pub attempted: usize,

    pub resolved: usize,

    pub not_found: usize,

    /// Resolver answered, but no plausible year could be extracted
    pub implausible: usize,

    /// Candidates left untouched because the limit was reached
    pub over_limit: usize,
}

impl EnrichmentReport {
    pub fn summary(&self) -> String {
        format!(
            "Enrichment: {} candidates, {} from cache, {} attempted, {} resolved, {} not found, {} implausible, {} over limit",
            self.candidates,
            self.from_cache,
            self.attempted,
            self.resolved,
            self.not_found,
            self.implausible,
            self.over_limit
        )
    }
}

struct Job {
    index: usize,
    key: CanonicalKey,
}

/// Ask `resolver` for every entity still lacking a birth year.
///
/// Cached years are applied without a resolver call. Each plausible result
/// is applied to its entity, appended to its provenance trail as
/// `"<resolver name>"` and written through to the cache before the next
/// result is looked at. A cache write failure aborts the run.
pub fn enrich_missing_birth_years(
    entities: &mut [ResolvedEntity],
    cache: &mut ReconciliationCache,
    resolver: &dyn AttributeResolver,
    bounds: &YearBounds,
    options: &EnrichmentOptions,
) -> Result<EnrichmentReport> {
    let mut report = EnrichmentReport::default();
    let mut jobs = Vec::new();

    for (index, entity) in entities.iter_mut().enumerate() {
        if entity.has_birth_year() {
            continue;
        }
        report.candidates += 1;

        let key = &entity.canonical_key;
        if let Some(year) = cache.lookup(key, bounds) {
            entity.birth_year = Some(year);
            entity.provenance_trail.push(CACHE_PROVENANCE.to_string());
            report.from_cache += 1;
            continue;
        }

        if jobs.len() >= options.limit {
            report.over_limit += 1;
            continue;
        }
        jobs.push(Job {
            index,
            key: key.clone(),
        });
    }

    if jobs.is_empty() {
        return Ok(report);
    }

    info!(
        jobs = jobs.len(),
        workers = options.workers,
        resolver = resolver.name(),
        "enrichment started"
    );

    let mut apply = |index: usize, resolution: Resolution| -> Result<()> {
        report.attempted += 1;
        let entity = &mut entities[index];

        let raw = match resolution {
            Resolution::Found(raw) => raw,
            Resolution::NotFound => {
                debug!(key = %entity.canonical_key, "not found");
                report.not_found += 1;
                return Ok(());
            }
        };

        let Some(year) = extract_with_bounds(&raw, bounds) else {
            debug!(key = %entity.canonical_key, raw = ?raw, "resolver value has no plausible year");
            report.implausible += 1;
            return Ok(());
        };

        entity.birth_year = Some(year);
        entity.provenance_trail.push(resolver.name().to_string());
        report.resolved += 1;

        cache.put(entity.canonical_key.clone(), year)
    };

    if options.workers <= 1 {
        for job in &jobs {
            let resolution = resolver.resolve(job.key.person(), job.key.org());
            apply(job.index, resolution)?;
        }
    } else {
        let (job_tx, job_rx) = unbounded::<&Job>();
        let (result_tx, result_rx) = unbounded::<(usize, Resolution)>();

        thread::scope(|scope| -> Result<()> {
            for _ in 0..options.workers.min(jobs.len()) {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for job in job_rx.iter() {
                        let resolution = resolver.resolve(job.key.person(), job.key.org());
                        if result_tx.send((job.index, resolution)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for job in &jobs {
                // receivers live until every job is handed out
                let _ = job_tx.send(job);
            }
            drop(job_tx);

            for (index, resolution) in result_rx.iter() {
                apply(index, resolution)?;
            }
            Ok(())
        })?;
    }

    info!(
        attempted = report.attempted,
        resolved = report.resolved,
        not_found = report.not_found,
        implausible = report.implausible,
        "enrichment finished"
    );

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;
    use crate::reconciliation::reconcile;
    use crate::record::RawRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn roster() -> Vec<ResolvedEntity> {
        reconcile(
            &[
                RawRecord::new("Nicola Zalewski", "manual").with_org("Inter"),
                RawRecord::new("Yunus Musah", "manual").with_org("Atalanta"),
                RawRecord::new("Marco Rossi", "manual").with_org("Genoa"),
                RawRecord::new("Kenan Yildiz", "manual").with_org("Juventus").with_birth_year(2005),
            ],
            2025,
        )
    }

    fn biographies() -> BiographyResolver {
        let mut resolver = BiographyResolver::new("wikipedia");
        resolver.insert(build_key("Nicola Zalewski", ""), "Nato il 23 gennaio 2002 a Tivoli");
        resolver.insert(build_key("Yunus Musah", "Atalanta"), 2002);
        resolver.insert(build_key("Marco Rossi", "Genoa"), "stagione 2025-26");
        resolver
    }

    #[test]
    fn test_serial_enrichment_writes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ReconciliationCache::open(&path).unwrap();
        let mut entities = roster();

        let report = enrich_missing_birth_years(
            &mut entities,
            &mut cache,
            &biographies(),
            &YearBounds::new(2025),
            &EnrichmentOptions::default(),
        )
        .unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.implausible, 1);

        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].provenance_trail, vec!["manual", "wikipedia"]);
        assert_eq!(entities[2].birth_year, None);

        let reloaded = ReconciliationCache::open(&path).unwrap();
        assert_eq!(reloaded.get(&build_key("Nicola Zalewski", "Inter")), Some(2002));
        assert_eq!(reloaded.get(&build_key("Yunus Musah", "Atalanta")), Some(2002));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReconciliationCache::open(dir.path().join("cache.json")).unwrap();
        let mut entities = roster();

        let report = enrich_missing_birth_years(
            &mut entities,
            &mut cache,
            &biographies(),
            &YearBounds::new(2025),
            &EnrichmentOptions { workers: 4, limit: 400 },
        )
        .unwrap();

        assert_eq!(report.resolved, 2);
        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[1].birth_year, Some(2002));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cached_entities_skip_resolver() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReconciliationCache::open(dir.path().join("cache.json")).unwrap();
        cache.put(build_key("Marco Rossi", "Genoa"), 1997).unwrap();

        let calls = AtomicUsize::new(0);
        let resolver = FnResolver::new("counting", |_: &str, _: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Resolution::NotFound
        });

        let mut entities = roster();
        let report = enrich_missing_birth_years(
            &mut entities,
            &mut cache,
            &resolver,
            &YearBounds::new(2025),
            &EnrichmentOptions::default(),
        )
        .unwrap();

        assert_eq!(report.from_cache, 1);
        assert_eq!(report.not_found, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entities[2].birth_year, Some(1997));
    }

    #[test]
    fn test_person_only_cache_entry_skips_resolver() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReconciliationCache::open(dir.path().join("cache.json")).unwrap();
        cache.put(build_key("Nicola Zalewski", ""), 2002).unwrap();

        let calls = AtomicUsize::new(0);
        let resolver = FnResolver::new("counting", |_: &str, _: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Resolution::NotFound
        });

        let mut entities = roster();
        let report = enrich_missing_birth_years(
            &mut entities,
            &mut cache,
            &resolver,
            &YearBounds::new(2025),
            &EnrichmentOptions::default(),
        )
        .unwrap();

        assert_eq!(report.from_cache, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].provenance_trail, vec!["manual", CACHE_PROVENANCE]);
    }

    #[test]
    fn test_limit_caps_resolver_calls() {
        let dir = TempDir::new().unwrap();
        let mut cache = ReconciliationCache::open(dir.path().join("cache.json")).unwrap();
        let mut entities = roster();

        let report = enrich_missing_birth_years(
            &mut entities,
            &mut cache,
            &biographies(),
            &YearBounds::new(2025),
            &EnrichmentOptions { workers: 1, limit: 1 },
        )
        .unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.over_limit, 2);
    }

    #[test]
    fn test_biography_file_loading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bios.json");
        fs::write(
            &path,
            r#"{"Nicola Zalewski": "nato il 23 gennaio 2002", "Yunus Musah|Atalanta": 2002, "x": null}"#,
        )
        .unwrap();

        let resolver = BiographyResolver::from_file(&path, &KeyBuilder::default()).unwrap();
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.name(), "bios");
        assert_eq!(
            resolver.resolve("yunus musah", "atalanta"),
            Resolution::Found(BirthYearInput::Integer(2002))
        );
        assert!(matches!(resolver.resolve("nicola zalewski", "roma"), Resolution::Found(_)));
        assert_eq!(resolver.resolve("nobody", ""), Resolution::NotFound);
    }
}
