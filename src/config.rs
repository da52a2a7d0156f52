// ⚙️ Configuration - Reference year, age bounds, aliases, worker pool
//
// Resolution order (highest priority first):
//   1. CLI flags (CliOverrides)
//   2. Environment variables (REF_YEAR, MIN_AGE)
//   3. TOML file (--config)
//   4. Compiled defaults

use crate::birth_year::{YearBounds, DEFAULT_MIN_AGE, DEFAULT_MIN_BIRTH_YEAR};
use crate::enrichment::EnrichmentOptions;
use crate::fuzzy::{NameMatcher, DEFAULT_THRESHOLD};
use crate::key::KeyBuilder;
use crate::normalizer::{AliasTable, Normalizer};
use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const ENV_REFERENCE_YEAR: &str = "REF_YEAR";
pub const ENV_MIN_AGE: &str = "MIN_AGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Current season year; bounds are computed against it
    pub reference_year: i32,
    pub min_age: i32,
    pub min_birth_year: i32,
    pub fuzzy_threshold: f64,

    /// Enrichment worker threads (1 = serial)
    pub workers: usize,

    /// Max resolver calls per run
    pub enrich_limit: usize,

    /// Extra alias → canonical spellings, merged over the built-in table
    pub aliases: BTreeMap<String, String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            reference_year: Local::now().year(),
            min_age: DEFAULT_MIN_AGE,
            min_birth_year: DEFAULT_MIN_BIRTH_YEAR,
            fuzzy_threshold: DEFAULT_THRESHOLD,
            workers: 1,
            enrich_limit: EnrichmentOptions::default().limit,
            aliases: BTreeMap::new(),
        }
    }
}

/// CLI flags that override configuration values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub reference_year: Option<i32>,
    pub workers: Option<usize>,
}

impl ReconcileConfig {
    /// Defaults → optional TOML file → process environment → CLI flags
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_from(|name| std::env::var(name).ok())?;
        config.apply_cli_overrides(cli);
        config.validate()?;

        debug!(?config, "configuration resolved");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Apply `REF_YEAR` / `MIN_AGE` via `lookup` (the process environment in
    /// production, a map in tests). Unparseable values are errors.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_REFERENCE_YEAR) {
            self.reference_year = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a year, got {:?}", ENV_REFERENCE_YEAR, raw))?;
        }
        if let Some(raw) = lookup(ENV_MIN_AGE) {
            self.min_age = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of years, got {:?}", ENV_MIN_AGE, raw))?;
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(year) = cli.reference_year {
            self.reference_year = year;
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.min_age) {
            bail!("min_age must be between 0 and 100, got {}", self.min_age);
        }
        if self.min_birth_year > self.reference_year {
            bail!(
                "min_birth_year ({}) is after reference_year ({})",
                self.min_birth_year,
                self.reference_year
            );
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            bail!("fuzzy_threshold must be between 0.0 and 1.0, got {}", self.fuzzy_threshold);
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        Ok(())
    }

    pub fn bounds(&self) -> YearBounds {
        YearBounds::new(self.reference_year)
            .with_min_age(self.min_age)
            .with_min_year(self.min_birth_year)
    }

    /// Built-in aliases plus the configured ones
    pub fn normalizer(&self) -> Normalizer {
        let mut aliases = AliasTable::with_defaults();
        aliases.extend(&self.aliases);
        Normalizer::new(aliases)
    }

    pub fn key_builder(&self) -> KeyBuilder {
        KeyBuilder::new(self.normalizer())
    }

    pub fn name_matcher(&self) -> NameMatcher {
        NameMatcher::new(self.fuzzy_threshold).with_normalizer(self.normalizer())
    }

    pub fn enrichment_options(&self) -> EnrichmentOptions {
        EnrichmentOptions {
            workers: self.workers,
            limit: self.enrich_limit,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
