//! Artifact emission: value normalization, logo resolution, serialization.
//!
//! Emission itself is a pure serialization step - every business decision
//! has already been made by the merge and gated by the validator. Two
//! mechanical transforms happen here:
//!
//! - **Normalization**: raw CSV cells become typed JSON. Empty / `null`
//!   cells turn into JSON `null`, `true`/`false` into booleans, and cells
//!   shaped like a JSON array or object are parsed; everything else stays a
//!   string. A JSON-shaped cell that does not parse is a data error.
//! - **Logo resolution**: the record's own logo filename (or, failing that,
//!   its provider's) is rewritten with the configured asset path prefix.
//!
//! Field insertion order from the merge is preserved; output is
//! byte-identical across runs over identical input.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::aggregate::NetworkArtifact;
use crate::dataset::ProviderTable;
use crate::error::{DataError, PipelineError, PipelineResult, ValidationReport};
use crate::merge::{is_provided, MergedRecord};

/// Turn one raw cell into its JSON value.
pub fn normalize_value(raw: &str) -> Result<Value, String> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if value.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if value.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    let looks_like_json = (value.starts_with('[') && value.ends_with(']'))
        || (value.starts_with('{') && value.ends_with('}'));
    if looks_like_json {
        return serde_json::from_str(value).map_err(|e| format!("not valid JSON: {}", e));
    }
    Ok(Value::String(value.to_string()))
}

/// Assemble the output object for one merged record.
///
/// Layout: `provider` first, payload fields in merge order, `logo` last.
/// Normalization failures are returned for the validator to collect; the
/// field keeps its raw string value so the shape stays inspectable.
pub fn build_record_json(
    record: &MergedRecord,
    providers: &ProviderTable,
    asset_prefix: &str,
) -> (Value, Vec<DataError>) {
    let mut out = Map::new();
    let mut errors = Vec::new();

    out.insert("provider".to_string(), Value::String(record.provider.clone()));

    for (field, value) in &record.fields {
        if field == "logo" {
            continue;
        }
        let raw = value.as_str().unwrap_or_default();
        match normalize_value(raw) {
            Ok(normalized) => {
                out.insert(field.clone(), normalized);
            }
            Err(message) => {
                errors.push(DataError::SchemaMismatch {
                    file: record.file.clone(),
                    message: format!(
                        "row {}: value {:?} for field '{}' {}",
                        record.row, raw, field, message
                    ),
                });
                out.insert(field.clone(), value.clone());
            }
        }
    }

    let own_logo = record
        .fields
        .get("logo")
        .and_then(Value::as_str)
        .filter(|v| is_provided(v));
    let logo = own_logo.or_else(|| providers.get(&record.provider).and_then(|p| p.logo()));
    if let Some(filename) = logo {
        out.insert(
            "logo".to_string(),
            Value::String(format!("{}/{}", asset_prefix.trim_end_matches('/'), filename)),
        );
    }

    (Value::Object(out), errors)
}

/// Assemble the output object for one network: category keys in declared
/// order, each an ordered record array.
pub fn build_artifact_json(
    artifact: &NetworkArtifact,
    providers: &ProviderTable,
    asset_prefix: &str,
) -> (Value, Vec<DataError>) {
    let mut out = Map::new();
    let mut errors = Vec::new();

    for (category, records) in &artifact.categories {
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let (json, mut record_errors) = build_record_json(record, providers, asset_prefix);
            errors.append(&mut record_errors);
            items.push(json);
        }
        out.insert(category.clone(), Value::Array(items));
    }

    (Value::Object(out), errors)
}

/// Write one file per network into `out_dir`. Callers must have run the
/// validator first; a non-empty error set here aborts without writing.
pub fn write_artifacts(
    artifacts: &[NetworkArtifact],
    providers: &ProviderTable,
    out_dir: &Path,
    asset_prefix: &str,
) -> PipelineResult<Vec<PathBuf>> {
    let mut rendered = Vec::with_capacity(artifacts.len());
    let mut report = ValidationReport::new();
    for artifact in artifacts {
        let (json, errors) = build_artifact_json(artifact, providers, asset_prefix);
        report.extend(errors);
        rendered.push((artifact.network.clone(), json));
    }
    if !report.is_empty() {
        return Err(PipelineError::Validation { report });
    }

    std::fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(out_dir, e))?;

    let mut written = Vec::with_capacity(rendered.len());
    for (network, json) in rendered {
        let path = out_dir.join(format!("{}.json", network));
        let content = format!("{}\n", serde_json::to_string_pretty(&json).expect("artifact is valid JSON"));
        std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
        written.push(path);
    }
    Ok(written)
}
