// 🔍 Deduplication Engine - One entity per canonical identity
//
// Records sharing a canonical key are merged field by field. When two
// records disagree on a field, the ordered tie-break rules decide:
//
//   1. Completeness  - a present value beats an absent one
//   2. Performance   - value from the record with higher performance_value
//   3. Cost          - value from the record with lower cost_value
//   4. Recency       - value from the most recently observed record
//
// A full tie keeps the value already held (first seen wins).
//
// Records for the same person under a different organization are matched
// at person level: an unknown organization gets filled in, a newer
// organization is recorded as a transfer.
//
// A birth year remembered from an earlier run (the cache) sits below every
// record-derived value. It still counts when telling namesakes apart.

use crate::key::CanonicalKey;
use crate::record::{RawRecord, ResolvedEntity, RoleCode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Provenance-trail entry for a birth year taken from the cache
pub const CACHE_PROVENANCE: &str = "cache";

// ============================================================================
// TIE-BREAK RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// Present value replaced an absent one
    Completeness,

    /// Mixed-case display name preferred over a single-case one
    Casing,

    /// Higher performance_value won
    Performance,

    /// Lower cost_value won
    Cost,

    /// Later observed_at won
    Recency,
}

/// Tie-break inputs of the record that supplied a value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evidence {
    pub performance: Option<f64>,
    pub cost: Option<f64>,
    pub observed_at: Option<NaiveDate>,
}

impl Evidence {
    pub fn of(record: &RawRecord) -> Self {
        Evidence {
            performance: record.performance_value,
            cost: record.cost_value,
            observed_at: record.observed_at,
        }
    }

    /// `Some(rule)` when `challenger` displaces `self` on a contested field,
    /// `None` when the incumbent value stays.
    pub fn challenged_by(&self, challenger: &Evidence) -> Option<TieBreak> {
        // Rule 2: higher performance; a known value beats an unknown one
        match compare_present(self.performance, challenger.performance, |a, b| {
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }) {
            Ordering::Less => return Some(TieBreak::Performance),
            Ordering::Greater => return None,
            Ordering::Equal => {}
        }

        // Rule 3: lower cost; a known value beats an unknown one
        match compare_present(self.cost, challenger.cost, |a, b| {
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        }) {
            Ordering::Less => return Some(TieBreak::Cost),
            Ordering::Greater => return None,
            Ordering::Equal => {}
        }

        // Rule 4: most recent observation
        match compare_present(self.observed_at, challenger.observed_at, |a, b| a.cmp(&b)) {
            Ordering::Less => Some(TieBreak::Recency),
            _ => None,
        }
    }

    /// Is `challenger` at least as recent as `self`? Undated records count as
    /// oldest; between two undated records arrival order decides.
    pub fn is_not_newer_than(&self, challenger: &Evidence) -> bool {
        match (self.observed_at, challenger.observed_at) {
            (Some(a), Some(b)) => b >= a,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Ordering from the challenger's point of view: `Less` means the challenger
/// wins, `Greater` means the incumbent wins, `Equal` defers to the next rule.
/// `prefer(incumbent, challenger)` follows the same convention.
fn compare_present<T: Copy>(
    incumbent: Option<T>,
    challenger: Option<T>,
    prefer: impl Fn(T, T) -> Ordering,
) -> Ordering {
    match (incumbent, challenger) {
        (Some(a), Some(b)) => prefer(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// FIELD
// ============================================================================

/// A merged scalar plus the evidence of the record that supplied it
#[derive(Debug, Clone)]
pub struct Field<T> {
    value: Option<T>,
    evidence: Option<Evidence>,
}

impl<T: Clone + PartialEq> Field<T> {
    pub fn empty() -> Self {
        Field {
            value: None,
            evidence: None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn evidence(&self) -> Option<&Evidence> {
        self.evidence.as_ref()
    }

    /// Offer a candidate value; returns the rule that made it win, if it did
    pub fn offer(&mut self, candidate: Option<T>, evidence: &Evidence) -> Option<TieBreak> {
        let candidate = candidate?;

        let rule = match (&self.value, &self.evidence) {
            (None, _) => TieBreak::Completeness,
            (Some(current), _) if *current == candidate => return None,
            (Some(_), Some(held)) => held.challenged_by(evidence)?,
            (Some(_), None) => TieBreak::Completeness,
        };

        self.set(candidate, evidence);
        Some(rule)
    }

    fn set(&mut self, value: T, evidence: &Evidence) {
        self.value = Some(value);
        self.evidence = Some(*evidence);
    }
}

/// Display names: a mixed-case spelling ("Nicolò Zaniolo") is better than a
/// shouted or lower-cased one before the usual rules apply.
fn offer_display_name(
    field: &mut Field<String>,
    candidate: &str,
    evidence: &Evidence,
) -> Option<TieBreak> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Some(current) = field.value() {
        match (is_mixed_case(current), is_mixed_case(candidate)) {
            (false, true) => {
                field.set(candidate.to_string(), evidence);
                return Some(TieBreak::Casing);
            }
            (true, false) => return None,
            _ => {}
        }
    }

    field.offer(Some(candidate.to_string()), evidence)
}

fn is_mixed_case(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && s.chars().any(char::is_lowercase)
}

// ============================================================================
// ENTITY BUILDER
// ============================================================================

/// Organization change recorded while merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub key_before: CanonicalKey,
    pub key_after: CanonicalKey,
    pub from_org: String,
    pub to_org: String,
    pub provenance: String,
    pub observed_at: Option<NaiveDate>,
}

impl TransferRecord {
    /// Provenance-trail marker for this transfer
    pub fn trail_entry(&self) -> String {
        format!(
            "transfer:{}->{}@{}",
            self.key_before.org(),
            self.key_after.org(),
            self.provenance
        )
    }
}

/// Merge state for one entity during a run
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    key: CanonicalKey,
    display_name: Field<String>,
    org_name: Field<String>,
    role_code: Field<RoleCode>,
    birth_year: Field<i32>,
    cached_birth_year: Option<i32>,
    performance_value: Field<f64>,
    cost_value: Field<f64>,
    provenance_trail: Vec<String>,
}

impl EntityBuilder {
    /// Seed a new entity from its first record
    pub fn seed(key: CanonicalKey, record: &RawRecord, birth_year: Option<i32>) -> Self {
        let mut builder = EntityBuilder {
            key,
            display_name: Field::empty(),
            org_name: Field::empty(),
            role_code: Field::empty(),
            birth_year: Field::empty(),
            cached_birth_year: None,
            performance_value: Field::empty(),
            cost_value: Field::empty(),
            provenance_trail: Vec::new(),
        };
        builder.absorb(record, birth_year);
        builder
    }

    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// Record-derived year, else the cached one
    pub fn birth_year(&self) -> Option<i32> {
        self.birth_year.value().copied().or(self.cached_birth_year)
    }

    /// True when the only known year came from the cache
    pub fn birth_year_from_cache(&self) -> bool {
        self.birth_year.value().is_none() && self.cached_birth_year.is_some()
    }

    /// Remember a cached year; the first one offered sticks
    pub fn offer_cached_birth_year(&mut self, year: Option<i32>) {
        if self.cached_birth_year.is_none() {
            self.cached_birth_year = year;
        }
    }

    pub fn provenance_trail(&self) -> &[String] {
        &self.provenance_trail
    }

    /// Merge every scalar field of `record` (organization only when it names
    /// the same canonical organization or fills an unknown one).
    pub fn absorb(&mut self, record: &RawRecord, birth_year: Option<i32>) {
        let evidence = Evidence::of(record);

        let decisions = [
            ("display_name", offer_display_name(&mut self.display_name, &record.person_name, &evidence)),
            ("role_code", self.role_code.offer(record.role_code.known(), &evidence)),
            ("birth_year", self.birth_year.offer(birth_year, &evidence)),
            ("performance_value", self.performance_value.offer(record.performance_value, &evidence)),
            ("cost_value", self.cost_value.offer(record.cost_value, &evidence)),
        ];

        for (field, rule) in decisions {
            if let Some(rule) = rule {
                debug!(key = %self.key, field, ?rule, provenance = %record.provenance, "field updated");
            }
        }

        self.provenance_trail.push(provenance_of(record));
    }

    /// Offer an organization spelling for the organization already held
    /// (or fill it in when unknown). Caller guarantees `key` matches.
    fn offer_org(&mut self, key: &CanonicalKey, record: &RawRecord) {
        let org = record.org().trim();
        if org.is_empty() {
            return;
        }
        let evidence = Evidence::of(record);
        if !self.key.has_org() && key.has_org() {
            self.key = key.clone();
        }
        offer_display_name(&mut self.org_name, org, &evidence);
    }

    /// Move the entity to a new organization
    fn transfer_to(&mut self, key: &CanonicalKey, record: &RawRecord) -> TransferRecord {
        let transfer = TransferRecord {
            key_before: self.key.clone(),
            key_after: key.clone(),
            from_org: self.org_name.value().cloned().unwrap_or_default(),
            to_org: record.org().trim().to_string(),
            provenance: provenance_of(record),
            observed_at: record.observed_at,
        };

        self.key = key.clone();
        self.org_name.set(transfer.to_org.clone(), &Evidence::of(record));
        self.provenance_trail.push(transfer.trail_entry());
        transfer
    }

    pub fn build(&self) -> ResolvedEntity {
        let mut provenance_trail = self.provenance_trail.clone();
        if self.birth_year_from_cache() {
            provenance_trail.push(CACHE_PROVENANCE.to_string());
        }

        ResolvedEntity {
            canonical_key: self.key.clone(),
            display_name: self.display_name.value().cloned().unwrap_or_default(),
            org_name: self.org_name.value().cloned().unwrap_or_default(),
            role_code: self.role_code.value().copied().unwrap_or_default(),
            birth_year: self.birth_year(),
            performance_value: self.performance_value.value().copied(),
            cost_value: self.cost_value.value().copied(),
            provenance_trail,
        }
    }
}

fn provenance_of(record: &RawRecord) -> String {
    let provenance = record.provenance.trim();
    if provenance.is_empty() {
        "unknown".to_string()
    } else {
        provenance.to_string()
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

/// What happened to an ingested record
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First sighting of this identity
    Created,

    /// Merged into an entity with the same canonical key
    Merged,

    /// Merged at person level, unknown organization filled in
    OrgFilled,

    /// Merged at person level, organization moved to the newer one
    Transferred(TransferRecord),

    /// Merged at person level; record is older than the held organization
    Historical,
}

/// How an incoming key was matched against existing entities
enum Located {
    Exact(usize),
    Person(usize),
    New,
}

/// Owns the merge state of a single run. Not shared across threads:
/// upstream workers hand results to the one thread that owns the engine.
#[derive(Debug, Default)]
pub struct DeduplicationEngine {
    entities: Vec<EntityBuilder>,
    by_key: HashMap<CanonicalKey, usize>,
    by_person: HashMap<String, Vec<usize>>,
}

impl DeduplicationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Merge one keyed record. `birth_year` is the already validated value.
    pub fn ingest(
        &mut self,
        key: CanonicalKey,
        record: &RawRecord,
        birth_year: Option<i32>,
    ) -> IngestOutcome {
        self.ingest_with_cached(key, record, birth_year, None)
    }

    /// Like `ingest`, with the cached year for a record that carries none.
    /// The cached year takes part in namesake separation but never beats a
    /// record-derived year.
    pub fn ingest_with_cached(
        &mut self,
        key: CanonicalKey,
        record: &RawRecord,
        birth_year: Option<i32>,
        cached_year: Option<i32>,
    ) -> IngestOutcome {
        let cached_year = if birth_year.is_some() { None } else { cached_year };

        match self.locate(&key, birth_year.or(cached_year)) {
            Located::Exact(idx) => {
                let entity = &mut self.entities[idx];
                entity.offer_org(&key, record);
                entity.absorb(record, birth_year);
                entity.offer_cached_birth_year(cached_year);
                IngestOutcome::Merged
            }
            Located::Person(idx) => {
                let outcome = self.merge_person(idx, key, record, birth_year);
                self.entities[idx].offer_cached_birth_year(cached_year);
                outcome
            }
            Located::New => {
                let idx = self.entities.len();
                let mut entity = EntityBuilder::seed(key.clone(), record, birth_year);
                entity.offer_cached_birth_year(cached_year);
                entity.offer_org(&key, record);
                self.entities.push(entity);
                self.by_key.insert(key.clone(), idx);
                self.by_person.entry(key.person().to_string()).or_default().push(idx);
                IngestOutcome::Created
            }
        }
    }

    /// Entities whose birth year currently comes only from the cache
    pub fn cache_filled(&self) -> usize {
        self.entities.iter().filter(|e| e.birth_year_from_cache()).count()
    }

    /// Resolved entities in first-seen order
    pub fn finish(self) -> Vec<ResolvedEntity> {
        self.entities.iter().map(EntityBuilder::build).collect()
    }

    fn locate(&self, key: &CanonicalKey, birth_year: Option<i32>) -> Located {
        if let Some(&idx) = self.by_key.get(key) {
            return Located::Exact(idx);
        }

        let Some(indices) = self.by_person.get(key.person()) else {
            return Located::New;
        };

        // Conflicting birth years mean namesakes, not one person
        let candidates: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&idx| match (self.entities[idx].birth_year(), birth_year) {
                (Some(held), Some(incoming)) => held == incoming,
                _ => true,
            })
            .collect();

        match candidates.as_slice() {
            [idx] => Located::Person(*idx),
            [] => Located::New,
            _ => {
                warn!(key = %key, candidates = candidates.len(), "ambiguous person match, keeping separate");
                Located::New
            }
        }
    }

    fn merge_person(
        &mut self,
        idx: usize,
        key: CanonicalKey,
        record: &RawRecord,
        birth_year: Option<i32>,
    ) -> IngestOutcome {
        let held_key = self.entities[idx].key().clone();

        let outcome = if !key.has_org() {
            IngestOutcome::Merged
        } else if !held_key.has_org() {
            self.entities[idx].offer_org(&key, record);
            IngestOutcome::OrgFilled
        } else {
            let entity = &self.entities[idx];
            let held = entity.org_name.evidence().copied();
            let incoming = Evidence::of(record);
            let newer = held.map_or(true, |h| h.is_not_newer_than(&incoming));

            if newer {
                let transfer = self.entities[idx].transfer_to(&key, record);
                info!(
                    person = %key.person(),
                    from = %transfer.from_org,
                    to = %transfer.to_org,
                    provenance = %transfer.provenance,
                    "transfer recorded"
                );
                IngestOutcome::Transferred(transfer)
            } else {
                debug!(key = %key, held = %held_key, "older organization observation, keeping current");
                IngestOutcome::Historical
            }
        };

        let entity = &mut self.entities[idx];
        entity.absorb(record, birth_year);

        let new_key = entity.key().clone();
        if new_key != held_key {
            self.by_key.remove(&held_key);
            self.by_key.insert(new_key, idx);
        }

        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ingest_all(records: &[(RawRecord, Option<i32>)]) -> (Vec<ResolvedEntity>, Vec<IngestOutcome>) {
        let mut engine = DeduplicationEngine::new();
        let outcomes = records
            .iter()
            .map(|(record, year)| {
                let key = build_key(&record.person_name, record.org());
                engine.ingest(key, record, *year)
            })
            .collect();
        (engine.finish(), outcomes)
    }

    #[test]
    fn test_completeness_beats_performance() {
        let a = RawRecord::new("Yunus Musah", "manual").with_org("Atalanta").with_performance(5.0);
        let b = RawRecord::new("Yunus Musah", "scrape").with_org("Atalanta").with_performance(3.0);

        let (entities, _) = ingest_all(&[(a, None), (b, Some(2002))]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].performance_value, Some(5.0));
    }

    #[test]
    fn test_absent_never_overwrites() {
        let a = RawRecord::new("Yunus Musah", "a").with_org("Atalanta").with_cost(10.0);
        let b = RawRecord::new("Yunus Musah", "b").with_org("Atalanta").with_performance(9.0);

        let (entities, _) = ingest_all(&[(a, Some(2002)), (b, None)]);

        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].cost_value, Some(10.0));
    }

    #[test]
    fn test_performance_dominance() {
        let low = RawRecord::new("Yunus Musah", "low").with_org("Atalanta").with_performance(5.5);
        let high = RawRecord::new("Yunus Musah", "high").with_org("Atalanta").with_performance(6.5);

        let (entities, _) = ingest_all(&[(low.clone(), Some(2001)), (high.clone(), Some(2002))]);
        assert_eq!(entities[0].birth_year, Some(2002));

        // order does not matter
        let (entities, _) = ingest_all(&[(high, Some(2002)), (low, Some(2001))]);
        assert_eq!(entities[0].birth_year, Some(2002));
    }

    #[test]
    fn test_cost_minimization_on_performance_tie() {
        let cheap = RawRecord::new("Yunus Musah", "cheap")
            .with_org("Atalanta")
            .with_performance(6.0)
            .with_cost(8.0);
        let pricey = RawRecord::new("Yunus Musah", "pricey")
            .with_org("Atalanta")
            .with_performance(6.0)
            .with_cost(12.0);

        let (entities, _) = ingest_all(&[(pricey, Some(2001)), (cheap, Some(2002))]);
        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].cost_value, Some(8.0));
    }

    #[test]
    fn test_recency_is_final_tie_break() {
        let old = RawRecord::new("Yunus Musah", "old").with_org("Atalanta").observed(date(2024, 1, 1));
        let new = RawRecord::new("Yunus Musah", "new").with_org("Atalanta").observed(date(2025, 1, 1));

        let (entities, _) = ingest_all(&[(new.clone(), Some(2002)), (old.clone(), Some(2001))]);
        assert_eq!(entities[0].birth_year, Some(2002));

        let (entities, _) = ingest_all(&[(old, Some(2001)), (new, Some(2002))]);
        assert_eq!(entities[0].birth_year, Some(2002));
    }

    #[test]
    fn test_full_tie_keeps_first_seen() {
        let a = RawRecord::new("Yunus Musah", "a").with_org("Atalanta");
        let b = RawRecord::new("Yunus Musah", "b").with_org("Atalanta");

        let (entities, _) = ingest_all(&[(a, Some(2002)), (b, Some(2001))]);
        assert_eq!(entities[0].birth_year, Some(2002));
    }

    #[test]
    fn test_provenance_trail_keeps_every_source() {
        let a = RawRecord::new("Yunus Musah", "a").with_org("Atalanta").with_performance(7.0);
        let b = RawRecord::new("Yunus Musah", "b").with_org("Atalanta BC").with_performance(1.0);
        let c = RawRecord::new("yunus musah", "").with_org("ATALANTA");

        let (entities, _) = ingest_all(&[(a, None), (b, None), (c, None)]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].provenance_trail, vec!["a", "b", "unknown"]);
    }

    #[test]
    fn test_display_name_prefers_mixed_case() {
        let shouted = RawRecord::new("NICOLA ZALEWSKI", "a").with_org("Inter").with_performance(9.0);
        let proper = RawRecord::new("Nicola Zalewski", "b").with_org("Inter").with_performance(1.0);

        let (entities, _) = ingest_all(&[(shouted, None), (proper, None)]);
        assert_eq!(entities[0].display_name, "Nicola Zalewski");
    }

    #[test]
    fn test_unknown_role_is_absent() {
        let known = RawRecord::new("Yunus Musah", "a").with_org("Atalanta").with_role(RoleCode::Midfielder);
        let unknown = RawRecord::new("Yunus Musah", "b").with_org("Atalanta").with_performance(9.0);

        let (entities, _) = ingest_all(&[(known, None), (unknown, None)]);
        assert_eq!(entities[0].role_code, RoleCode::Midfielder);
    }

    #[test]
    fn test_transfer_recorded() {
        let a = RawRecord::new("Yunus Musah", "tm-2024").with_org("Milan").observed(date(2024, 8, 1));
        let b = RawRecord::new("Yunus Musah", "tm-2025").with_org("Atalanta").observed(date(2025, 8, 1));

        let (entities, outcomes) = ingest_all(&[(a, Some(2002)), (b, None)]);

        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.org_name, "Atalanta");
        assert_eq!(entity.canonical_key, build_key("Yunus Musah", "Atalanta"));
        assert_eq!(entity.birth_year, Some(2002));
        assert!(entity.provenance_trail.contains(&"tm-2024".to_string()));
        assert!(entity.provenance_trail.contains(&"tm-2025".to_string()));
        assert!(entity.provenance_trail.contains(&"transfer:milan->atalanta@tm-2025".to_string()));

        match &outcomes[1] {
            IngestOutcome::Transferred(t) => {
                assert_eq!(t.from_org, "Milan");
                assert_eq!(t.to_org, "Atalanta");
            }
            other => panic!("expected transfer, got {:?}", other),
        }
    }

    #[test]
    fn test_older_org_observation_does_not_transfer() {
        let current = RawRecord::new("Yunus Musah", "new").with_org("Atalanta").observed(date(2025, 8, 1));
        let stale = RawRecord::new("Yunus Musah", "old").with_org("Milan").observed(date(2024, 8, 1));

        let (entities, outcomes) = ingest_all(&[(current, None), (stale, None)]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].org_name, "Atalanta");
        assert_eq!(outcomes[1], IngestOutcome::Historical);
        assert_eq!(entities[0].provenance_trail, vec!["new", "old"]);
    }

    #[test]
    fn test_unknown_org_is_filled_in() {
        let bare = RawRecord::new("Nicola Zalewski", "manual");
        let full = RawRecord::new("Nicola Zalewski", "scrape").with_org("Inter");

        let (entities, outcomes) = ingest_all(&[(bare, None), (full, None)]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].org_name, "Inter");
        assert_eq!(entities[0].canonical_key, build_key("Nicola Zalewski", "Inter"));
        assert_eq!(outcomes[1], IngestOutcome::OrgFilled);
    }

    #[test]
    fn test_record_without_org_joins_known_person() {
        let full = RawRecord::new("Nicola Zalewski", "scrape").with_org("Inter");
        let bare = RawRecord::new("Nicola Zalewski", "bio");

        let (entities, _) = ingest_all(&[(full, None), (bare, Some(2002))]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].org_name, "Inter");
        assert_eq!(entities[0].birth_year, Some(2002));
    }

    #[test]
    fn test_conflicting_birth_years_are_namesakes() {
        let a = RawRecord::new("Marco Rossi", "a").with_org("Genoa");
        let b = RawRecord::new("Marco Rossi", "b").with_org("Parma");

        let (entities, _) = ingest_all(&[(a, Some(1990)), (b, Some(2004))]);
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_cached_year_separates_namesakes() {
        let genoa = RawRecord::new("Marco Rossi", "a").with_org("Genoa");
        let parma = RawRecord::new("Marco Rossi", "b").with_org("Parma");

        let mut engine = DeduplicationEngine::new();
        engine.ingest_with_cached(build_key("Marco Rossi", "Genoa"), &genoa, None, Some(1990));
        let outcome = engine.ingest(build_key("Marco Rossi", "Parma"), &parma, Some(2004));

        assert_eq!(outcome, IngestOutcome::Created);
        assert_eq!(engine.cache_filled(), 1);

        let entities = engine.finish();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].org_name, "Genoa");
        assert_eq!(entities[0].birth_year, Some(1990));
        assert_eq!(entities[0].provenance_trail, vec!["a", CACHE_PROVENANCE]);
        assert_eq!(entities[1].birth_year, Some(2004));
        assert_eq!(entities[1].provenance_trail, vec!["b"]);
    }

    #[test]
    fn test_record_year_outranks_cached_year() {
        let a = RawRecord::new("Yunus Musah", "a").with_org("Atalanta").with_performance(3.0);
        let b = RawRecord::new("Yunus Musah", "b").with_org("Atalanta");

        let mut engine = DeduplicationEngine::new();
        engine.ingest_with_cached(build_key("Yunus Musah", "Atalanta"), &a, None, Some(2001));
        engine.ingest(build_key("Yunus Musah", "Atalanta"), &b, Some(2002));
        assert_eq!(engine.cache_filled(), 0);

        let entities = engine.finish();
        assert_eq!(entities[0].birth_year, Some(2002));
        assert!(!entities[0].provenance_trail.contains(&CACHE_PROVENANCE.to_string()));
    }

    #[test]
    fn test_cached_year_ignored_when_record_has_one() {
        let a = RawRecord::new("Yunus Musah", "a").with_org("Atalanta");

        let mut engine = DeduplicationEngine::new();
        engine.ingest_with_cached(build_key("Yunus Musah", "Atalanta"), &a, Some(2002), Some(2001));

        let entities = engine.finish();
        assert_eq!(entities[0].birth_year, Some(2002));
        assert_eq!(entities[0].provenance_trail, vec!["a"]);
    }

    #[test]
    fn test_evidence_rules_in_order() {
        let strong = Evidence { performance: Some(7.0), cost: Some(30.0), observed_at: None };
        let weak = Evidence { performance: Some(6.0), cost: Some(1.0), observed_at: Some(date(2025, 1, 1)) };

        assert_eq!(weak.challenged_by(&strong), Some(TieBreak::Performance));
        assert_eq!(strong.challenged_by(&weak), None);

        let unknown = Evidence { performance: None, cost: None, observed_at: None };
        assert_eq!(unknown.challenged_by(&weak), Some(TieBreak::Performance));
        assert_eq!(unknown.challenged_by(&unknown), None);
    }
}
