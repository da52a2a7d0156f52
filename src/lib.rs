// Roster Reconciliation - Core Library
// Exposes all modules for use in the CLI and tests

pub mod normalizer;     // Text canonicalization + org aliases
pub mod key;            // Canonical person@@org keys
pub mod birth_year;     // Birth-year extraction and plausibility bounds
pub mod record;         // Raw observations and resolved entities
pub mod deduplication;  // Per-person merge with field-level evidence
pub mod cache;          // Persistent birth-year cache
pub mod reconciliation; // Batch reconciliation + run report
pub mod enrichment;     // Filling missing birth years from a resolver
pub mod fuzzy;          // Name similarity lookup
pub mod data_quality;   // Post-run quality audit
pub mod store;          // JSON / JSONL / CSV input and output
pub mod db;             // SQLite ledger of observations, identities, transfers
pub mod config;         // Layered configuration
pub mod logging;        // tracing subscriber setup

// Re-export commonly used types
pub use normalizer::{normalize, strip_accents, AliasTable, Normalizer};
pub use key::{build_key, parse_key, CanonicalKey, KeyBuilder};
pub use birth_year::{
    extract_birth_year, extract_with_bounds, BirthYearInput, ExtractionMethod, YearBounds,
};
pub use record::{RawRecord, ResolvedEntity, RoleCode};
pub use deduplication::{DeduplicationEngine, IngestOutcome, TieBreak, TransferRecord};
pub use cache::{CleanReport, LoadStats, ReconciliationCache};
pub use reconciliation::{
    reconcile, ReconciliationEngine, ReconciliationOutcome, ReconciliationReport, RejectReason,
    Rejection,
};
pub use enrichment::{
    enrich_missing_birth_years, AttributeResolver, BiographyResolver, EnrichmentOptions,
    EnrichmentReport, FnResolver, Resolution,
};
pub use fuzzy::{NameMatch, NameMatcher};
pub use data_quality::{
    DataQualityEngine, QualityAudit, QualityIssue, QualityReport, QualitySummary, Severity,
    ValidationResult as QualityValidationResult,
};
pub use store::{load_all, load_records, read_entities, write_entities, InputFormat, LoadedRecords};
pub use db::{open_database, persist_run, setup_database, Event, PersistStats};
pub use config::{CliOverrides, ReconcileConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
