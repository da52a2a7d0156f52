// ⚖️ Reconciliation Engine - Raw observations → one entity per identity
//
// Pipeline per record:
//   reject empty name → build CanonicalKey → extract/validate birth year
//   → (no year? ReconciliationCache lookup) → DeduplicationEngine::ingest
//
// After the merge, record-derived years for keys the cache does not know yet
// are appended to it. Existing cache entries are never overwritten here.

use crate::birth_year::{extract_with_bounds, YearBounds};
use crate::cache::ReconciliationCache;
use crate::deduplication::{DeduplicationEngine, IngestOutcome, TransferRecord};
use crate::key::{CanonicalKey, KeyBuilder};
use crate::record::{RawRecord, ResolvedEntity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use crate::deduplication::CACHE_PROVENANCE;

// ============================================================================
// REJECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Person name missing or blank
    EmptyPersonName,

    /// Person name present but normalizes to nothing (e.g. only punctuation)
    UnusablePersonName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub provenance: String,
    pub reason: RejectReason,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Records handed to the engine (accepted + rejected)
    pub records_processed: usize,

    /// Records rejected by the loader or the engine
    pub rejected_at_input: usize,

    pub rejections: Vec<Rejection>,

    pub entities_resolved: usize,

    pub missing_birth_year: usize,

    /// Year-bearing fields that yielded no plausible year
    pub implausible_birth_years: usize,

    /// Birth years taken from the cache
    pub cache_hits: usize,

    pub transfers: Vec<TransferRecord>,

    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    fn new() -> Self {
        ReconciliationReport {
            records_processed: 0,
            rejected_at_input: 0,
            rejections: Vec::new(),
            entities_resolved: 0,
            missing_birth_year: 0,
            implausible_birth_years: 0,
            cache_hits: 0,
            transfers: Vec::new(),
            reconciled_at: Utc::now(),
        }
    }

    /// Count entries the loader skipped before they reached the engine
    pub fn add_input_rejections(&mut self, skipped: usize) {
        self.records_processed += skipped;
        self.rejected_at_input += skipped;
    }

    /// Recount entity-level figures (after enrichment changed birth years)
    pub fn refresh(&mut self, entities: &[ResolvedEntity]) {
        self.entities_resolved = entities.len();
        self.missing_birth_year = entities.iter().filter(|e| !e.has_birth_year()).count();
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} records processed, {} rejected at input, {} entities resolved, \
             {} missing birth year, {} implausible birth years, {} cache hits, {} transfers",
            self.records_processed,
            self.rejected_at_input,
            self.entities_resolved,
            self.missing_birth_year,
            self.implausible_birth_years,
            self.cache_hits,
            self.transfers.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub entities: Vec<ResolvedEntity>,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    keys: KeyBuilder,
    bounds: YearBounds,
}

impl ReconciliationEngine {
    pub fn new(keys: KeyBuilder, bounds: YearBounds) -> Self {
        ReconciliationEngine { keys, bounds }
    }

    /// Built-in aliases, default age bounds
    pub fn with_reference_year(reference_year: i32) -> Self {
        Self::new(KeyBuilder::default(), YearBounds::new(reference_year))
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn bounds(&self) -> &YearBounds {
        &self.bounds
    }

    /// Merge without a cache. Never fails: bad input is counted, not raised.
    pub fn merge_records(&self, records: &[RawRecord]) -> ReconciliationOutcome {
        self.merge(records, None)
    }

    fn merge(&self, records: &[RawRecord], cache: Option<&ReconciliationCache>) -> ReconciliationOutcome {
        let mut report = ReconciliationReport::new();
        let mut engine = DeduplicationEngine::new();

        for record in records {
            report.records_processed += 1;

            let key = match self.key_for(record) {
                Ok(key) => key,
                Err(reason) => {
                    warn!(
                        provenance = %record.provenance,
                        reason = ?reason,
                        "record rejected"
                    );
                    report.rejected_at_input += 1;
                    report.rejections.push(Rejection {
                        provenance: record.provenance.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let birth_year = record
                .birth_year_raw
                .as_ref()
                .and_then(|raw| {
                    let year = extract_with_bounds(raw, &self.bounds);
                    if year.is_none() {
                        debug!(key = %key, raw = ?raw, "no plausible birth year");
                        report.implausible_birth_years += 1;
                    }
                    year
                });

            let cached_year = match (birth_year, cache) {
                (None, Some(cache)) => cache.lookup(&key, &self.bounds),
                _ => None,
            };
            if let Some(year) = cached_year {
                debug!(key = %key, year, "birth year from cache");
            }

            let outcome = engine.ingest_with_cached(key, record, birth_year, cached_year);
            if let IngestOutcome::Transferred(transfer) = outcome {
                report.transfers.push(transfer);
            }
        }

        report.cache_hits = engine.cache_filled();
        let entities = engine.finish();
        report.refresh(&entities);

        ReconciliationOutcome { entities, report }
    }

    /// Merge with the cache consulted for records lacking a year, then
    /// append newly learned years to it. A cache write failure is an error.
    pub fn reconcile(
        &self,
        records: &[RawRecord],
        cache: Option<&mut ReconciliationCache>,
    ) -> Result<ReconciliationOutcome> {
        let outcome = self.merge(records, cache.as_deref());

        if let Some(cache) = cache {
            let derived = outcome
                .entities
                .iter()
                .filter(|e| !e.provenance_trail.iter().any(|p| p == CACHE_PROVENANCE))
                .filter_map(|e| e.birth_year.map(|year| (e.canonical_key.clone(), year)));

            let added = cache.append_all(derived)?;
            if added > 0 {
                debug!(added, "cache extended from records");
            }
        }

        info!(
            processed = outcome.report.records_processed,
            rejected = outcome.report.rejected_at_input,
            entities = outcome.report.entities_resolved,
            missing_birth_year = outcome.report.missing_birth_year,
            transfers = outcome.report.transfers.len(),
            "reconciliation finished"
        );

        Ok(outcome)
    }

    fn key_for(&self, record: &RawRecord) -> std::result::Result<CanonicalKey, RejectReason> {
        if record.person_name.trim().is_empty() {
            return Err(RejectReason::EmptyPersonName);
        }
        let key = self.keys.build(&record.person_name, record.org());
        if key.person().is_empty() {
            return Err(RejectReason::UnusablePersonName);
        }
        Ok(key)
    }
}

/// Reconcile with the built-in alias table and no cache
pub fn reconcile(records: &[RawRecord], reference_year: i32) -> Vec<ResolvedEntity> {
    ReconciliationEngine::with_reference_year(reference_year)
        .merge_records(records)
        .entities
}

// ============================================================================
// TESTS
// ============================================================================
