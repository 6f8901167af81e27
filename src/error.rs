//! Error types for the chaindex generation pipeline.
//!
//! Two families with very different lifecycles:
//!
//! - [`ParseError`] - structural problems in a source file. Fatal: the table
//!   shape is unknown, so nothing downstream can run. Aborts the run with
//!   file/line context.
//! - [`DataError`] - semantic problems in the dataset. Collected into a
//!   [`ValidationReport`] and surfaced together, so a contributor sees every
//!   problem in one pass instead of one per run.
//!
//! [`PipelineError`] is the top-level type returned by the orchestration
//! entry points; conversion is automatic via `From` so `?` works across
//! module boundaries.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Structural (fatal) errors
// =============================================================================

/// Malformed source file shape. Cannot be collected: once the row shape is
/// broken the rest of the table is meaningless.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Row shape or encoding problem reported by the CSV reader.
    #[error("{}: line {line}: {message}", .file.display())]
    Malformed {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// A table is missing an identity column its consumers index by.
    #[error("{}: missing required column '{column}'", .file.display())]
    MissingColumn { file: PathBuf, column: String },

    /// File contains no header row.
    #[error("{}: file is empty", .file.display())]
    Empty { file: PathBuf },
}

// =============================================================================
// Data-level (collected) errors
// =============================================================================

/// One semantic problem in the dataset, with enough context to point a
/// contributor at the offending cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Two provider rows share a slug.
    #[error("{}: row {row}: duplicate provider slug '{slug}'", .file.display())]
    DuplicateSlug {
        file: PathBuf,
        row: usize,
        slug: String,
    },

    /// Two offer rows share a (category, slug) key.
    #[error("{}: row {row}: duplicate offer '{slug}' in category '{category}'", .file.display())]
    DuplicateOffer {
        file: PathBuf,
        row: usize,
        category: String,
        slug: String,
    },

    /// Two listings resolve to the same identity within one network scope.
    #[error("{}: row {row}: duplicate listing '{provider}/{offer}' for network '{scope}'", .file.display())]
    DuplicateListing {
        file: PathBuf,
        row: usize,
        scope: String,
        provider: String,
        offer: String,
    },

    /// A reference token (or an offer's provider slug) does not resolve.
    #[error("{}: row {row}: unresolved reference: {reference}", .file.display())]
    UnresolvedReference {
        file: PathBuf,
        row: usize,
        reference: String,
    },

    /// A merged record is missing a field its category schema requires.
    #[error("{}: row {row}: missing required field '{field}' for category '{category}'", .file.display())]
    MissingRequiredField {
        file: PathBuf,
        row: usize,
        category: String,
        field: String,
    },

    /// A value (or an assembled artifact) does not match its declared shape.
    #[error("{}: {message}", .file.display())]
    SchemaMismatch { file: PathBuf, message: String },

    /// Slug column not in ascending order.
    #[error("{}: row {row}: slug '{slug}' breaks ascending order (follows '{previous}')", .file.display())]
    SlugOrder {
        file: PathBuf,
        row: usize,
        slug: String,
        previous: String,
    },
}

// =============================================================================
// Validation report
// =============================================================================

/// Every [`DataError`] found in one run, in discovery order.
///
/// Artifact generation is gated on `is_empty()`: a non-empty report means
/// nothing is written or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<DataError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: DataError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = DataError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataError> {
        self.errors.iter()
    }

    /// One-line summary for progress output.
    pub fn summary(&self) -> String {
        match self.errors.len() {
            0 => "dataset is valid".to_string(),
            1 => "1 validation error".to_string(),
            n => format!("{} validation errors", n),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "  - {}", error)?;
        }
        Ok(())
    }
}

// =============================================================================
// Enrichment errors
// =============================================================================

/// Errors from the verified-metrics enrichment client.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Required environment variable not set or empty.
    #[error("missing required environment variable {0}")]
    MissingEnv(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Upstream response could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Pipeline errors (top-level)
// =============================================================================

/// Top-level orchestration errors returned by `pipeline::validate` and
/// `pipeline::generate`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable source or unwritable output. Reported with its own exit
    /// code, distinct from data problems.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Structural parse failure, fail-fast.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The collected report was not empty; no artifacts were written.
    #[error("dataset validation failed with {} error(s)", .report.len())]
    Validation { report: ValidationReport },

    /// The embedded artifact schema failed to load. A broken build of this
    /// binary, not a data problem.
    #[error("embedded schema error: {0}")]
    Schema(String),

    /// Enrichment failure.
    #[error("enrichment failed: {0}")]
    Enrich(#[from] EnrichError),
}

impl PipelineError {
    /// Shorthand for I/O failures that carry the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
