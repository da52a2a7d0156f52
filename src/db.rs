// 🗄️ Roster Ledger - SQLite persistence of reconciliation runs
//
// Tables:
//   observations     every accepted raw record, deduplicated by SHA-256 hash
//   player_identity  one row per canonical key (upserted each run)
//   player_transfers one row per recorded organization change
//   events           audit trail (uuid v4 event ids)

use crate::deduplication::TransferRecord;
use crate::key::{parse_key, KeyBuilder};
use crate::reconciliation::ReconciliationOutcome;
use crate::record::{RawRecord, ResolvedEntity, RoleCode};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

const ACTOR: &str = "roster_reconcile";

// ============================================================================
// EVENTS
// ============================================================================

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            canonical_key TEXT NOT NULL,
            person_name TEXT NOT NULL,
            org_name TEXT,
            role_code TEXT NOT NULL,
            birth_year_raw TEXT,
            performance_value REAL,
            cost_value REAL,
            provenance TEXT NOT NULL,
            observed_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS player_identity (
            canonical_key TEXT PRIMARY KEY,
            person TEXT NOT NULL,
            org TEXT NOT NULL,
            display_name TEXT NOT NULL,
            org_name TEXT NOT NULL,
            role_code TEXT NOT NULL,
            birth_year INTEGER,
            performance_value REAL,
            cost_value REAL,
            provenance_trail TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS player_transfers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person TEXT NOT NULL,
            key_before TEXT NOT NULL,
            key_after TEXT NOT NULL,
            from_org TEXT NOT NULL,
            to_org TEXT NOT NULL,
            provenance TEXT NOT NULL,
            observed_at TEXT,
            UNIQUE (key_before, key_after, provenance)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_key ON observations(canonical_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transfers_person ON player_transfers(person)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// OBSERVATIONS
// ============================================================================

/// Deduplication hash of one observation (not an identity: two sources
/// reporting the same facts hash differently because provenance differs)
pub fn observation_hash(key: &str, record: &RawRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{:?}|{:?}|{:?}|{}|{:?}",
        key,
        record.person_name.trim(),
        record.role_code,
        record.birth_year_raw,
        record.performance_value,
        record.cost_value,
        record.provenance,
        record.observed_at
    ));
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Store raw observations; re-importing the same observation is a no-op.
/// Records without a usable person name are not stored.
pub fn insert_observations(
    conn: &Connection,
    records: &[RawRecord],
    keys: &KeyBuilder,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for record in records {
        let key = keys.build(&record.person_name, record.org());
        if key.person().is_empty() {
            continue;
        }
        let key = key.to_string();
        let hash = observation_hash(&key, record);

        let birth_year_raw = record
            .birth_year_raw
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = conn.execute(
            "INSERT INTO observations (
                idempotency_hash, canonical_key, person_name, org_name, role_code,
                birth_year_raw, performance_value, cost_value, provenance, observed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                hash,
                key,
                record.person_name,
                record.org_name,
                record.role_code.as_str(),
                birth_year_raw,
                record.performance_value,
                record.cost_value,
                record.provenance,
                record.observed_at.map(|d| d.to_string()),
            ],
        );

        match result {
            Ok(_) => stats.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                stats.duplicates += 1;
            }
            Err(e) => return Err(e).context("Failed to insert observation"),
        }
    }

    debug!(inserted = stats.inserted, duplicates = stats.duplicates, "observations stored");
    Ok(stats)
}

pub fn count_observations(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// IDENTITIES
// ============================================================================

pub fn upsert_entities(conn: &Connection, entities: &[ResolvedEntity]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();

    for entity in entities {
        let trail = serde_json::to_string(&entity.provenance_trail)?;
        conn.execute(
            "INSERT INTO player_identity (
                canonical_key, person, org, display_name, org_name, role_code,
                birth_year, performance_value, cost_value, provenance_trail, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(canonical_key) DO UPDATE SET
                display_name = excluded.display_name,
                org_name = excluded.org_name,
                role_code = excluded.role_code,
                birth_year = COALESCE(excluded.birth_year, player_identity.birth_year),
                performance_value = excluded.performance_value,
                cost_value = excluded.cost_value,
                provenance_trail = excluded.provenance_trail,
                updated_at = excluded.updated_at",
            params![
                entity.canonical_key.to_string(),
                entity.canonical_key.person(),
                entity.canonical_key.org(),
                entity.display_name,
                entity.org_name,
                entity.role_code.as_str(),
                entity.birth_year,
                entity.performance_value,
                entity.cost_value,
                trail,
                now,
            ],
        )
        .with_context(|| format!("Failed to upsert identity {}", entity.canonical_key))?;
    }

    Ok(entities.len())
}

pub fn get_identity(conn: &Connection, canonical_key: &str) -> Result<Option<ResolvedEntity>> {
    let row = conn
        .query_row(
            "SELECT canonical_key, display_name, org_name, role_code, birth_year,
                    performance_value, cost_value, provenance_trail
             FROM player_identity
             WHERE canonical_key = ?1",
            params![canonical_key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i32>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((key, display_name, org_name, role, birth_year, performance, cost, trail)) = row else {
        return Ok(None);
    };

    Ok(Some(ResolvedEntity {
        canonical_key: parse_key(&key),
        display_name,
        org_name,
        role_code: RoleCode::parse(&role),
        birth_year,
        performance_value: performance,
        cost_value: cost,
        provenance_trail: serde_json::from_str(&trail)
            .with_context(|| format!("Corrupt provenance trail for {}", key))?,
    }))
}

pub fn count_identities(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM player_identity", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// TRANSFERS
// ============================================================================

/// Returns how many transfers were new
pub fn insert_transfers(conn: &Connection, transfers: &[TransferRecord]) -> Result<usize> {
    let mut inserted = 0;

    for transfer in transfers {
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO player_transfers (
                    person, key_before, key_after, from_org, to_org, provenance, observed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    transfer.key_after.person(),
                    transfer.key_before.to_string(),
                    transfer.key_after.to_string(),
                    transfer.from_org,
                    transfer.to_org,
                    transfer.provenance,
                    transfer.observed_at.map(|d| d.to_string()),
                ],
            )
            .context("Failed to insert transfer")?;

        if changed > 0 {
            inserted += 1;
            let event = Event::new(
                "player_transferred",
                "player",
                &transfer.key_after.to_string(),
                serde_json::json!({
                    "from": transfer.from_org,
                    "to": transfer.to_org,
                    "source": transfer.provenance,
                }),
                ACTOR,
            );
            insert_event(conn, &event)?;
        }
    }

    Ok(inserted)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRow {
    pub from_org: String,
    pub to_org: String,
    pub provenance: String,
    pub observed_at: Option<String>,
}

/// Transfer history of a normalized person name, oldest first
pub fn get_transfers_for_person(conn: &Connection, person: &str) -> Result<Vec<TransferRow>> {
    let mut stmt = conn.prepare(
        "SELECT from_org, to_org, provenance, observed_at
         FROM player_transfers
         WHERE person = ?1
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![person], |row| {
            Ok(TransferRow {
                from_org: row.get(0)?,
                to_org: row.get(1)?,
                provenance: row.get(2)?,
                observed_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )
    .context("Failed to insert event")?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// RUN PERSISTENCE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub observations: ImportStats,
    pub identities: usize,
    pub transfers: usize,
}

/// Store a whole run atomically: observations, identities, transfers and a
/// run event. Returns the run id with the stats.
pub fn persist_run(
    conn: &mut Connection,
    records: &[RawRecord],
    outcome: &ReconciliationOutcome,
    keys: &KeyBuilder,
) -> Result<(String, PersistStats)> {
    let tx = conn.transaction().context("Failed to begin transaction")?;

    let observations = insert_observations(&tx, records, keys)?;
    let identities = upsert_entities(&tx, &outcome.entities)?;
    let transfers = insert_transfers(&tx, &outcome.report.transfers)?;

    let run = Event::new(
        "reconciliation_run",
        "run",
        &uuid::Uuid::new_v4().to_string(),
        serde_json::to_value(&outcome.report).context("Failed to serialize run report")?,
        ACTOR,
    );
    insert_event(&tx, &run)?;

    tx.commit().context("Failed to commit run")?;

    let stats = PersistStats {
        observations,
        identities,
        transfers,
    };
    info!(
        run = %run.entity_id,
        observations = stats.observations.inserted,
        duplicates = stats.observations.duplicates,
        identities = stats.identities,
        transfers = stats.transfers,
        "run persisted"
    );

    Ok((run.entity_id, stats))
}

// ============================================================================
// TESTS
// ============================================================================
