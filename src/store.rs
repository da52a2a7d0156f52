// 📂 Roster Store - Read raw records, write resolved entities
//
// Supported files (by extension):
//   .json          array of records, or {"players": [...]}
//   .jsonl/.ndjson one record per line
//   .csv           header row + one record per row
//
// Malformed entries are skipped and counted; an unreadable file is an error.
// Writers back up any file they are about to replace.

use crate::record::{RawRecord, ResolvedEntity};
use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// FORMAT DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    JsonLines,
    Csv,
}

impl InputFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Ok(InputFormat::Json),
            "jsonl" | "ndjson" => Ok(InputFormat::JsonLines),
            "csv" => Ok(InputFormat::Csv),
            other => bail!(
                "Unsupported file extension '{}' for {} (expected .json, .jsonl, .ndjson or .csv)",
                other,
                path.display()
            ),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub records: Vec<RawRecord>,

    /// Entries that could not be read as a record
    pub skipped: usize,
}

impl LoadedRecords {
    /// Append another source (argument order is preserved)
    pub fn extend(&mut self, other: LoadedRecords) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

/// Load one input file
pub fn load_records(path: &Path) -> Result<LoadedRecords> {
    let format = InputFormat::detect(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let entries = match format {
        InputFormat::Json => read_json(path)?,
        InputFormat::JsonLines => read_json_lines(path)?,
        InputFormat::Csv => read_csv(path)?,
    };

    let mut loaded = LoadedRecords::default();
    for (index, entry) in entries {
        let parsed = entry.and_then(|value| {
            serde_json::from_value::<RawRecord>(value).map_err(|e| e.to_string())
        });

        match parsed {
            Ok(mut record) => {
                if record.provenance.trim().is_empty() {
                    record.provenance = format!("{}:{}", source, index);
                }
                loaded.records.push(record);
            }
            Err(reason) => {
                warn!(source = %source, entry = index, %reason, "skipping malformed entry");
                loaded.skipped += 1;
            }
        }
    }

    info!(
        source = %source,
        records = loaded.records.len(),
        skipped = loaded.skipped,
        "input loaded"
    );
    Ok(loaded)
}

/// Load several files, concatenated in argument order
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedRecords> {
    let mut all = LoadedRecords::default();
    for path in paths {
        all.extend(load_records(path.as_ref())?);
    }
    Ok(all)
}

/// (1-based entry index, entry or parse error)
type Entry = (usize, std::result::Result<serde_json::Value, String>);

fn read_json(path: &Path) -> Result<Vec<Entry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Input file is not valid JSON: {}", path.display()))?;

    let items = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("players") {
            Some(serde_json::Value::Array(items)) => items,
            _ => bail!(
                "Expected a JSON array or an object with a \"players\" array: {}",
                path.display()
            ),
        },
        _ => bail!("Expected a JSON array of records: {}", path.display()),
    };

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(i, value)| (i + 1, Ok(value)))
        .collect())
}

fn read_json_lines(path: &Path) -> Result<Vec<Entry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, serde_json::from_str(line).map_err(|e| e.to_string())))
        .collect())
}

/// CSV cells become JSON strings so the record's field aliases and lenient
/// scalar parsing apply unchanged. Headers are matched case-insensitively;
/// empty cells are left out.
fn read_csv(path: &Path) -> Result<Vec<Entry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .clone();

    let mut entries = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let entry = row.map_err(|e| e.to_string()).map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .zip(row.iter())
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(h, cell)| {
                    (h.to_lowercase(), serde_json::Value::String(cell.to_string()))
                })
                .collect();
            serde_json::Value::Object(map)
        });
        entries.push((i + 1, entry));
    }

    Ok(entries)
}

// ============================================================================
// WRITING
// ============================================================================

/// Flat CSV row (provenance trail joined with ';')
#[derive(Debug, Serialize)]
struct EntityRow {
    canonical_key: String,
    display_name: String,
    org_name: String,
    role_code: String,
    birth_year: Option<i32>,
    performance_value: Option<f64>,
    cost_value: Option<f64>,
    provenance_trail: String,
}

impl From<&ResolvedEntity> for EntityRow {
    fn from(entity: &ResolvedEntity) -> Self {
        EntityRow {
            canonical_key: entity.canonical_key.to_string(),
            display_name: entity.display_name.clone(),
            org_name: entity.org_name.clone(),
            role_code: entity.role_code.to_string(),
            birth_year: entity.birth_year,
            performance_value: entity.performance_value,
            cost_value: entity.cost_value,
            provenance_trail: entity.provenance_trail.join(";"),
        }
    }
}

/// Write entities in the format implied by the extension. An existing file
/// is first copied to a timestamped backup, whose path is returned.
pub fn write_entities(path: &Path, entities: &[ResolvedEntity]) -> Result<Option<PathBuf>> {
    let format = InputFormat::detect(path)?;

    let body = match format {
        InputFormat::Json => {
            serde_json::to_string_pretty(entities).context("Failed to serialize entities")?
        }
        InputFormat::JsonLines => {
            let mut out = String::new();
            for entity in entities {
                out.push_str(&serde_json::to_string(entity).context("Failed to serialize entity")?);
                out.push('\n');
            }
            out
        }
        InputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(Vec::new());
            for entity in entities {
                wtr.serialize(EntityRow::from(entity))
                    .context("Failed to serialize entity row")?;
            }
            let bytes = wtr.into_inner().context("Failed to finish CSV output")?;
            String::from_utf8(bytes).context("CSV output is not UTF-8")?
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let backup = backup_existing(path)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).with_context(|| format!("Failed to write output: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace output file: {}", path.display()))?;

    info!(path = %path.display(), entities = entities.len(), "output written");
    Ok(backup)
}

/// Read back a file written by `write_entities` (JSON or JSON Lines)
pub fn read_entities(path: &Path) -> Result<Vec<ResolvedEntity>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster file: {}", path.display()))?;

    match InputFormat::detect(path)? {
        InputFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Roster file is not a JSON entity array: {}", path.display())),
        InputFormat::JsonLines => content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Bad entity on line {} of {}", i + 1, path.display())
                })
            })
            .collect(),
        InputFormat::Csv => bail!("Reading resolved rosters from CSV is not supported: {}", path.display()),
    }
}

/// `roster.json` → `roster.20250801-101500.bak.json`
pub fn backup_path(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.bak.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}.{}.bak", stem, stamp),
    };
    path.with_file_name(name)
}

fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = backup_path(path);
    fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    debug!(from = %path.display(), to = %backup.display(), "backup created");
    Ok(Some(backup))
}

// ============================================================================
// TESTS
// ============================================================================
