//! High-level pipeline API: the `validate` and `generate` entry points.
//!
//! Phase 1 (load + index) must complete before Phase 2 (resolve, merge,
//! aggregate) starts, because Phase 2 reads the finished lookup tables.
//! The validator is the single barrier before emission: `generate` writes
//! nothing unless the report is empty, so a failed run never leaves partial
//! artifacts behind.

use std::env;
use std::path::PathBuf;

use crate::aggregate::{self, NetworkArtifact};
use crate::dataset::Dataset;
use crate::emit;
use crate::error::{PipelineError, PipelineResult, ValidationReport};
use crate::merge::{self, MergedRecord};
use crate::validation;

/// Default prefix prepended to provider logo filenames.
pub const DEFAULT_ASSET_PREFIX: &str = "/assets/logos";

/// Default output directory for artifacts.
pub const DEFAULT_OUT_DIR: &str = "json";

/// Run configuration. CLI flags override environment variables, which
/// override the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Dataset root (holds providers.csv, offers/, networks/).
    pub root: PathBuf,
    /// Directory artifacts are written into.
    pub out_dir: PathBuf,
    /// Asset path prefix for logo rewriting.
    pub asset_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Configuration from `CHAINDEX_ROOT`, `CHAINDEX_OUT` and
    /// `CHAINDEX_ASSET_PREFIX`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: env::var("CHAINDEX_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            out_dir: env::var("CHAINDEX_OUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.out_dir),
            asset_prefix: env::var("CHAINDEX_ASSET_PREFIX").unwrap_or(defaults.asset_prefix),
        }
    }
}

/// Result of a validation run.
#[derive(Debug)]
pub struct ValidateOutcome {
    pub report: ValidationReport,
    pub providers: usize,
    pub offers: usize,
    pub networks: usize,
    /// Listing rows that made it through resolution and merge.
    pub records: usize,
}

/// Result of a successful generation run.
#[derive(Debug)]
pub struct GenerateOutcome {
    pub written: Vec<PathBuf>,
    pub networks: usize,
    pub records: usize,
}

struct Phases {
    dataset: Dataset,
    merged: Vec<MergedRecord>,
    artifacts: Vec<NetworkArtifact>,
    report: ValidationReport,
}

fn run_phases(config: &Config) -> PipelineResult<Phases> {
    // Phase 1: load and index. Tables are immutable from here on.
    let dataset = Dataset::load(&config.root)?;
    log::info!(
        "loaded {} providers, {} offers, {} networks",
        dataset.providers.len(),
        dataset.offers.len(),
        dataset.networks.len()
    );

    // Phase 2: per-listing resolution and merge.
    let mut merged = Vec::new();
    let mut merge_errors = Vec::new();
    for listing in &dataset.listings {
        let (mut records, mut errors) = merge::resolve_listing_file(listing, &dataset.offers);
        merged.append(&mut records);
        merge_errors.append(&mut errors);
    }

    let artifacts = aggregate::aggregate(&dataset.networks, &dataset.listings, &merged);

    // The gate.
    let report = validation::validate_dataset(
        &dataset,
        &merged,
        &artifacts,
        merge_errors,
        &config.asset_prefix,
    )?;

    Ok(Phases {
        dataset,
        merged,
        artifacts,
        report,
    })
}

/// Run loader, tables, resolver, merger and validator; return the report.
/// I/O and parse failures are errors; data problems land in the report.
pub fn validate(config: &Config) -> PipelineResult<ValidateOutcome> {
    let phases = run_phases(config)?;
    Ok(ValidateOutcome {
        providers: phases.dataset.providers.len(),
        offers: phases.dataset.offers.len(),
        networks: phases.dataset.networks.len(),
        records: phases.merged.len(),
        report: phases.report,
    })
}

/// Validate, then write one artifact per network. All-or-nothing: a
/// non-empty report aborts before anything is written.
pub fn generate(config: &Config) -> PipelineResult<GenerateOutcome> {
    let phases = run_phases(config)?;
    if !phases.report.is_empty() {
        return Err(PipelineError::Validation {
            report: phases.report,
        });
    }

    let written = emit::write_artifacts(
        &phases.artifacts,
        &phases.dataset.providers,
        &config.out_dir,
        &config.asset_prefix,
    )?;
    log::info!("wrote {} artifact(s) to {}", written.len(), config.out_dir.display());

    Ok(GenerateOutcome {
        written,
        networks: phases.dataset.networks.len(),
        records: phases.merged.len(),
    })
}
