//! Dataset-wide validation.
//!
//! Runs after all tables and per-listing merges are computed and is the
//! single gate before emission: artifacts are written only when the
//! collected [`ValidationReport`] is empty. Every check appends typed
//! [`DataError`]s instead of failing on the first hit, so a contributor
//! sees the whole damage in one run.
//!
//! The assembled artifacts additionally pass through an embedded JSON
//! Schema (Draft 7) before they are written - the same shape the catalog
//! front-end consumes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::aggregate::NetworkArtifact;
use crate::dataset::Dataset;
use crate::emit;
use crate::error::{DataError, PipelineError, PipelineResult, ValidationReport};
use crate::merge::{is_provided, MergedRecord};
use crate::schema;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid slug pattern"));

/// Run every dataset check and collect the results into one report.
///
/// `merge_errors` are the unresolved-reference errors the resolver already
/// produced; they are surfaced here together with everything else. The only
/// `Err` is [`PipelineError::Schema`]: the embedded artifact schema failing
/// to load, which no amount of data editing can fix.
pub fn validate_dataset(
    dataset: &Dataset,
    merged: &[MergedRecord],
    artifacts: &[NetworkArtifact],
    merge_errors: Vec<DataError>,
    asset_prefix: &str,
) -> PipelineResult<ValidationReport> {
    let mut report = ValidationReport::new();

    // Build-time findings: duplicates and slug ordering.
    report.extend(dataset.providers.issues.iter().cloned());
    report.extend(dataset.offers.issues.iter().cloned());
    report.extend(merge_errors);

    check_slug_formats(dataset, &mut report);
    check_provider_fields(dataset, &mut report);
    check_offer_providers(dataset, &mut report);
    check_merged_records(dataset, merged, &mut report);
    check_duplicate_listings(merged, &mut report);
    check_artifact_schemas(dataset, artifacts, asset_prefix, &mut report)?;

    Ok(report)
}

fn check_slug_formats(dataset: &Dataset, report: &mut ValidationReport) {
    for provider in dataset.providers.iter() {
        if !SLUG_RE.is_match(&provider.slug) {
            report.push(DataError::SchemaMismatch {
                file: dataset.providers.file.clone(),
                message: format!(
                    "row {}: {:?} is not a valid slug (lowercase letters, digits, hyphens)",
                    provider.row, provider.slug
                ),
            });
        }
    }
    for offer in dataset.offers.iter() {
        if !SLUG_RE.is_match(&offer.slug) {
            report.push(DataError::SchemaMismatch {
                file: offer.file.clone(),
                message: format!(
                    "row {}: {:?} is not a valid slug (lowercase letters, digits, hyphens)",
                    offer.row, offer.slug
                ),
            });
        }
    }
    // Network directory names become artifact file names.
    for network in &dataset.networks {
        if !SLUG_RE.is_match(network) {
            report.push(DataError::SchemaMismatch {
                file: dataset.root.join("networks").join(network),
                message: format!("network directory {:?} is not a valid slug", network),
            });
        }
    }
}

fn check_provider_fields(dataset: &Dataset, report: &mut ValidationReport) {
    for provider in dataset.providers.iter() {
        let named = provider
            .fields
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(is_provided);
        if !named {
            report.push(DataError::MissingRequiredField {
                file: dataset.providers.file.clone(),
                row: provider.row,
                category: "providers".to_string(),
                field: "name".to_string(),
            });
        }
    }
}

fn check_offer_providers(dataset: &Dataset, report: &mut ValidationReport) {
    for offer in dataset.offers.iter() {
        if dataset.providers.get(&offer.provider).is_none() {
            report.push(DataError::UnresolvedReference {
                file: offer.file.clone(),
                row: offer.row,
                reference: format!("provider '{}'", offer.provider),
            });
        }
    }
}

fn check_merged_records(
    dataset: &Dataset,
    merged: &[MergedRecord],
    report: &mut ValidationReport,
) {
    for record in merged {
        let Some(category) = schema::category(&record.category) else {
            continue; // unknown categories never load
        };

        if record.provider.is_empty() {
            report.push(DataError::MissingRequiredField {
                file: record.file.clone(),
                row: record.row,
                category: record.category.clone(),
                field: "provider".to_string(),
            });
        } else if dataset.providers.get(&record.provider).is_none() {
            report.push(DataError::UnresolvedReference {
                file: record.file.clone(),
                row: record.row,
                reference: format!("provider '{}'", record.provider),
            });
        }

        for field in category.required {
            let present = record
                .fields
                .get(*field)
                .and_then(Value::as_str)
                .is_some_and(is_provided);
            if !present {
                report.push(DataError::MissingRequiredField {
                    file: record.file.clone(),
                    row: record.row,
                    category: record.category.clone(),
                    field: (*field).to_string(),
                });
            }
        }

        for field in record.fields.keys() {
            if !schema::is_declared(category, field) {
                log::warn!(
                    "{}: row {}: column '{}' is not declared for category '{}'",
                    record.file.display(),
                    record.row,
                    field,
                    record.category
                );
            }
        }

        // Normalization dry-run: JSON-shaped cells must actually parse.
        // Checked once per merged record, not per artifact, so all-networks
        // rows are reported a single time.
        let (_, errors) = emit::build_record_json(record, &dataset.providers, "");
        report.extend(errors);
    }
}

fn check_duplicate_listings(merged: &[MergedRecord], report: &mut ValidationReport) {
    // Identity includes the listing's own network scope: an all-networks row
    // and a specific-network row for the same provider/offer are distinct
    // listing instances and may both appear in one network's output.
    let mut seen = HashSet::new();
    for record in merged {
        let key = (
            record.scope.clone(),
            record.category.clone(),
            record.provider.clone(),
            record.offer_id.clone(),
        );
        if !seen.insert(key) {
            report.push(DataError::DuplicateListing {
                file: record.file.clone(),
                row: record.row,
                scope: record.scope.to_string(),
                provider: record.provider.clone(),
                offer: record.offer_id.clone(),
            });
        }
    }
}

fn check_artifact_schemas(
    dataset: &Dataset,
    artifacts: &[NetworkArtifact],
    asset_prefix: &str,
    report: &mut ValidationReport,
) -> PipelineResult<()> {
    for artifact in artifacts {
        // Record-level errors were already collected; only shape findings
        // from the schema are new here.
        let (json, _) = emit::build_artifact_json(artifact, &dataset.providers, asset_prefix);
        for message in validate_artifact(&json)? {
            report.push(DataError::SchemaMismatch {
                file: PathBuf::from(format!("{}.json", artifact.network)),
                message,
            });
        }
    }
    Ok(())
}

/// Validate an assembled artifact against the embedded Draft 7 schema.
///
/// `Ok` carries the violation messages (empty when the artifact conforms);
/// `Err` means the embedded schema itself failed to load.
pub fn validate_artifact(data: &Value) -> PipelineResult<Vec<String>> {
    let schema: Value = serde_json::from_str(include_str!("../schemas/network-artifact.json"))
        .map_err(|e| PipelineError::Schema(e.to_string()))?;
    let validator = jsonschema::draft7::new(&schema)
        .map_err(|e| PipelineError::Schema(e.to_string()))?;

    Ok(validator.iter_errors(data).map(|e| e.to_string()).collect())
}
