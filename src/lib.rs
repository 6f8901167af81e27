//! # chaindex - per-network catalogs of blockchain service providers
//!
//! chaindex turns a normalized, cross-referenced CSV dataset (providers,
//! their offers, and per-network availability) into flattened JSON
//! artifacts a catalog front-end can consume without further joins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  CSV dataset │────▶│ Loader+Tables│────▶│ Resolve+Merge │────▶│  Aggregate   │
//! │ (providers,  │     │  (immutable  │     │  (row wins)   │     │ (per network)│
//! │  offers,     │     │   lookups)   │     └───────────────┘     └──────┬───────┘
//! │  networks)   │     └──────────────┘                                  │
//! └──────────────┘                                  ┌───────────┐  ┌─────▼──────┐
//!                                                   │  Emitter  │◀─│ Validator  │
//!                                                   │ (json/*.  │  │  (gate)    │
//!                                                   │   json)   │  └────────────┘
//!                                                   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chaindex::{pipeline, Config};
//!
//! let config = Config::from_env();
//! let outcome = pipeline::generate(&config)?;
//! println!("wrote {} artifacts", outcome.written.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - error taxonomy and the validation report
//! - [`schema`] - declared per-category schemas
//! - [`loader`] - CSV parsing into ordered, header-keyed records
//! - [`dataset`] - source-tree discovery and immutable lookup tables
//! - [`merge`] - reference resolution and override merging
//! - [`aggregate`] - per-network union of listings
//! - [`validation`] - collected dataset checks, the gate before emission
//! - [`emit`] - normalization, logo rewriting, serialization
//! - [`enrich`] - verified SLA metrics for emitted artifacts
//! - [`pipeline`] - `validate()` / `generate()` orchestration

pub mod aggregate;
pub mod dataset;
pub mod emit;
pub mod enrich;
pub mod error;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod schema;
pub mod validation;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    DataError, EnrichError, ParseError, PipelineError, PipelineResult, ValidationReport,
};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use loader::{load_table, read_table, Row, Table};

pub use dataset::{
    Dataset, ListingFile, NetworkScope, Offer, OfferTable, Provider, ProviderTable,
    ALL_NETWORKS_DIR,
};

// =============================================================================
// Re-exports - Merge and aggregation
// =============================================================================

pub use merge::{classify, merge_fields, MergedRecord, OfferField, OFFER_REF_PREFIX};

pub use aggregate::{aggregate, NetworkArtifact};

// =============================================================================
// Re-exports - Validation and emission
// =============================================================================

pub use validation::{validate_artifact, validate_dataset};

pub use emit::{build_artifact_json, build_record_json, normalize_value, write_artifacts};

// =============================================================================
// Re-exports - Enrichment
// =============================================================================

pub use enrich::{enrich_network_data, normalize_metrics, VerifiedClient, VerifiedProvider};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    generate, validate, Config, GenerateOutcome, ValidateOutcome, DEFAULT_ASSET_PREFIX,
    DEFAULT_OUT_DIR,
};
