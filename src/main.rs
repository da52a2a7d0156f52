use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use roster_reconcile::config::{CliOverrides, ReconcileConfig};
use roster_reconcile::data_quality::DataQualityEngine;
use roster_reconcile::db::{open_database, persist_run};
use roster_reconcile::enrichment::{enrich_missing_birth_years, BiographyResolver};
use roster_reconcile::logging::init_tracing;
use roster_reconcile::reconciliation::ReconciliationEngine;
use roster_reconcile::{store, ReconciliationCache};

#[derive(Parser)]
#[command(name = "roster-reconcile", version, about = "Merge noisy roster sources into one canonical roster")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "ROSTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile raw records into one entity per player
    #[command(after_help = "\
Examples:
  roster-reconcile reconcile --input scrape.json --input manual.csv --output roster.json
  roster-reconcile reconcile --input feed.jsonl --output roster.json --cache age_cache.json --enrich-from bios.json")]
    Reconcile {
        /// Input files (.json, .jsonl, .csv), merged in the order given
        #[arg(long = "input", short, required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (.json, .jsonl, .csv); an existing file is backed up
        #[arg(long, short)]
        output: PathBuf,

        /// Birth-year cache (created if missing)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// SQLite ledger to record the run in
        #[arg(long)]
        db: Option<PathBuf>,

        /// Biography file used to fill missing birth years (requires --cache)
        #[arg(long, requires = "cache")]
        enrich_from: Option<PathBuf>,

        /// Overrides REF_YEAR and the config file
        #[arg(long)]
        reference_year: Option<i32>,

        /// Enrichment worker threads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Re-key a cache file and drop implausible years
    CleanCache {
        #[arg(long)]
        cache: PathBuf,

        /// Write the cleaned cache here instead of in place
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        reference_year: Option<i32>,
    },

    /// Fuzzy-match names against a resolved roster
    MatchName {
        /// Roster written by `reconcile` (.json or .jsonl)
        #[arg(long)]
        roster: PathBuf,

        /// Names to look up
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Reconcile {
            inputs,
            output,
            cache,
            db,
            enrich_from,
            reference_year,
            workers,
        } => {
            let config = ReconcileConfig::load(
                cli.config.as_deref(),
                &CliOverrides {
                    reference_year,
                    workers,
                },
            )?;
            run_reconcile(
                &config,
                &inputs,
                &output,
                cache.as_deref(),
                db.as_deref(),
                enrich_from.as_deref(),
            )
        }
        Command::CleanCache {
            cache,
            output,
            reference_year,
        } => {
            let config = ReconcileConfig::load(
                cli.config.as_deref(),
                &CliOverrides {
                    reference_year,
                    workers: None,
                },
            )?;
            run_clean_cache(&config, &cache, output.as_deref())
        }
        Command::MatchName { roster, queries } => {
            let config = ReconcileConfig::load(cli.config.as_deref(), &CliOverrides::default())?;
            run_match_name(&config, &roster, &queries)
        }
    }
}

fn run_reconcile(
    config: &ReconcileConfig,
    inputs: &[PathBuf],
    output: &Path,
    cache_path: Option<&Path>,
    db_path: Option<&Path>,
    biographies: Option<&Path>,
) -> Result<()> {
    println!("⚽ Roster Reconciliation (reference year {})", config.reference_year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let keys = config.key_builder();
    let bounds = config.bounds();

    // 1. Load inputs
    println!("\n📂 Loading {} input file(s)...", inputs.len());
    let loaded = store::load_all(inputs)?;
    println!(
        "✓ Loaded {} records ({} malformed entries skipped)",
        loaded.records.len(),
        loaded.skipped
    );

    // 2. Reconcile
    println!("\n🔍 Reconciling...");
    let mut cache = match cache_path {
        Some(path) => Some(ReconciliationCache::open_with(path, &keys)?),
        None => None,
    };
    let engine = ReconciliationEngine::new(keys.clone(), bounds);
    let mut outcome = engine.reconcile(&loaded.records, cache.as_mut())?;
    outcome.report.add_input_rejections(loaded.skipped);

    for transfer in &outcome.report.transfers {
        println!(
            "  ↪ {}: {} → {} ({})",
            transfer.key_after.person(),
            transfer.from_org,
            transfer.to_org,
            transfer.provenance
        );
    }

    // 3. Enrich missing birth years
    if let (Some(bios), Some(cache)) = (biographies, cache.as_mut()) {
        println!("\n🌐 Enriching missing birth years from {}...", bios.display());
        let resolver = BiographyResolver::from_file(bios, &keys)?;
        let enrichment = enrich_missing_birth_years(
            &mut outcome.entities,
            cache,
            &resolver,
            &bounds,
            &config.enrichment_options(),
        )?;
        outcome.report.refresh(&outcome.entities);
        println!("✓ {}", enrichment.summary());
    }

    // 4. Write output
    println!("\n💾 Writing {}...", output.display());
    let backup = store::write_entities(output, &outcome.entities)
        .with_context(|| format!("Output not written: {}", output.display()))?;
    if let Some(backup) = backup {
        println!("✓ Previous version backed up to {}", backup.display());
    }
    println!("✓ Wrote {} entities", outcome.entities.len());

    // 5. Ledger
    if let Some(db_path) = db_path {
        println!("\n🗄️  Recording run in {}...", db_path.display());
        let mut conn = open_database(db_path)?;
        let (run_id, stats) = persist_run(&mut conn, &loaded.records, &outcome, &keys)?;
        println!(
            "✓ Run {}: {} new observations ({} already known), {} identities, {} new transfers",
            run_id,
            stats.observations.inserted,
            stats.observations.duplicates,
            stats.identities,
            stats.transfers
        );
    }

    // 6. Report
    let audit = DataQualityEngine::new(bounds).audit(&outcome.entities);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 {}", outcome.report.summary());
    println!("✅ {}", audit.summary.summary());
    for report in audit.flagged().iter().take(10) {
        println!("  ⚠️  {}", report.summary());
    }

    Ok(())
}

fn run_clean_cache(config: &ReconcileConfig, cache_path: &Path, output: Option<&Path>) -> Result<()> {
    println!("🧹 Cleaning cache {} (reference year {})", cache_path.display(), config.reference_year);

    let mut cache = ReconciliationCache::open_with(cache_path, &config.key_builder())?;
    if let Some(output) = output {
        cache.retarget(output);
    }

    let report = cache.clean(&config.bounds())?;
    println!(
        "✓ Kept {}, dropped {}, re-keyed {} → {}",
        report.kept,
        report.dropped,
        report.rekeyed,
        cache.path().display()
    );

    Ok(())
}

fn run_match_name(config: &ReconcileConfig, roster: &Path, queries: &[String]) -> Result<()> {
    let entities = store::read_entities(roster)?;
    let names: Vec<&str> = entities.iter().map(|e| e.display_name.as_str()).collect();
    let matcher = config.name_matcher();

    for query in queries {
        match matcher.best_match(query, names.iter().copied()) {
            Some(found) => println!("{} → {} ({:.2})", query, found.candidate, found.score),
            None => println!("{} → no match", query),
        }
    }

    Ok(())
}
