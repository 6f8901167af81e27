//! Reference resolution and override merging.
//!
//! A listing row either carries its full field set inline, or points at a
//! canonical offer with a `!offer:<slug>` token and overrides individual
//! fields. Which of the two is an explicit sum type ([`OfferField`]) decided
//! once per row - downstream code never sniffs strings.
//!
//! Merge rule (row wins): for every field present in either source, the
//! listing row's value is used whenever it is *provided* - present, non-empty
//! and not the literal `null` - otherwise the hydrated baseline value is
//! used; fields provided by neither source are omitted. An explicitly empty
//! cell therefore does NOT clobber a hydrated value; emptying a field means
//! removing it from the canonical offer. The merge is pure: same inputs,
//! same record.

use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::dataset::{ListingFile, NetworkScope, OfferTable};
use crate::error::DataError;

/// Marker introducing a reference token in a listing's `offer` column.
pub const OFFER_REF_PREFIX: &str = "!offer:";

/// Columns that identify a listing rather than describe it; they never
/// become payload fields.
const IDENTITY_COLUMNS: &[&str] = &["provider", "offer"];

// =============================================================================
// Reference token
// =============================================================================

/// How a listing row supplies its offer fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferField {
    /// `!offer:<slug>` - hydrate from the canonical offer of the row's
    /// category.
    Reference(String),
    /// Self-contained row; the literal offer identifier, if one was given.
    Inline(Option<String>),
}

/// Classify a listing row's `offer` cell.
pub fn classify(cell: Option<&str>) -> OfferField {
    match cell {
        Some(value) if value.starts_with(OFFER_REF_PREFIX) => {
            OfferField::Reference(value[OFFER_REF_PREFIX.len()..].trim().to_string())
        }
        Some(value) if is_provided(value) => OfferField::Inline(Some(value.to_string())),
        _ => OfferField::Inline(None),
    }
}

/// A cell value counts as provided when it is non-empty and not the
/// literal `null`. Cells are already trimmed by the loader.
pub fn is_provided(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("null")
}

// =============================================================================
// Merged record
// =============================================================================

/// The denormalized result of resolving and merging one listing row.
/// Recomputed every run, never persisted.
#[derive(Debug, Clone)]
pub struct MergedRecord {
    /// Slug of the provider this listing belongs to. Empty when the row
    /// carried none - the validator rejects that.
    pub provider: String,
    pub category: String,
    pub scope: NetworkScope,
    /// Offer slug for hydrated rows, the literal `offer` value (or display
    /// name) for inline rows. Part of the listing's identity.
    pub offer_id: String,
    pub file: PathBuf,
    pub row: usize,
    /// Merged payload fields: baseline columns first in offer column order,
    /// then row-only columns in listing column order.
    pub fields: Map<String, Value>,
}

/// Merge a hydration baseline with a listing row's own payload under
/// row-wins precedence. Both maps hold raw string cells.
pub fn merge_fields(
    baseline: &Map<String, Value>,
    row: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();

    for (field, base) in baseline {
        let override_value = row
            .get(field)
            .and_then(Value::as_str)
            .filter(|v| is_provided(v));
        match override_value {
            Some(value) => {
                merged.insert(field.clone(), Value::String(value.to_string()));
            }
            None => {
                if base.as_str().is_some_and(is_provided) {
                    merged.insert(field.clone(), base.clone());
                }
            }
        }
    }

    for (field, value) in row {
        if baseline.contains_key(field) {
            continue;
        }
        if value.as_str().is_some_and(is_provided) {
            merged.insert(field.clone(), value.clone());
        }
    }

    merged
}

/// Resolve and merge every row of one listing file.
///
/// Rows whose reference token does not resolve are dropped (no partial
/// merge); the error carries the offending file, row, and slug.
pub fn resolve_listing_file(
    listing: &ListingFile,
    offers: &OfferTable,
) -> (Vec<MergedRecord>, Vec<DataError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for row in &listing.table.rows {
        let mut payload = Map::new();
        for (column, value) in &row.values {
            if !IDENTITY_COLUMNS.contains(&column.as_str()) {
                payload.insert(column.clone(), value.clone());
            }
        }

        let (provider, offer_id, fields) = match classify(row.get("offer")) {
            OfferField::Reference(slug) => {
                match offers.get(&listing.category, &slug) {
                    Some(offer) => (
                        offer.provider.clone(),
                        offer.slug.clone(),
                        merge_fields(&offer.fields, &payload),
                    ),
                    None => {
                        errors.push(DataError::UnresolvedReference {
                            file: listing.table.file.clone(),
                            row: row.line,
                            reference: format!(
                                "{}{} (no such offer in category '{}')",
                                OFFER_REF_PREFIX, slug, listing.category
                            ),
                        });
                        continue;
                    }
                }
            }
            OfferField::Inline(literal) => {
                let fields = merge_fields(&Map::new(), &payload);
                let provider = row
                    .get("provider")
                    .filter(|v| is_provided(v))
                    .unwrap_or("")
                    .to_string();
                // Inline rows are identified by their literal offer value,
                // falling back to the display name.
                let offer_id = literal.unwrap_or_else(|| {
                    fields
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string()
                });
                (provider, offer_id, fields)
            }
        };

        records.push(MergedRecord {
            provider,
            category: listing.category.clone(),
            scope: listing.scope.clone(),
            offer_id,
            file: listing.table.file.clone(),
            row: row.line,
            fields,
        });
    }

    (records, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_table;
    use serde_json::json;
    use std::path::Path;

    fn string_map(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn rpc_offers(csv: &str) -> OfferTable {
        let table = read_table(csv.as_bytes(), Path::new("offers/rpc.csv")).unwrap();
        OfferTable::build(&[("rpc".into(), table)])
    }

    fn rpc_listing(csv: &str, network: &str) -> ListingFile {
        ListingFile {
            scope: NetworkScope::Network(network.into()),
            category: "rpc".into(),
            table: read_table(csv.as_bytes(), Path::new("networks/ethereum/rpc.csv")).unwrap(),
        }
    }

    #[test]
    fn test_classify_reference_token() {
        assert_eq!(
            classify(Some("!offer:alchemy-free")),
            OfferField::Reference("alchemy-free".into())
        );
        assert_eq!(
            classify(Some("My Custom RPC")),
            OfferField::Inline(Some("My Custom RPC".into()))
        );
        assert_eq!(classify(Some("")), OfferField::Inline(None));
        assert_eq!(classify(Some("null")), OfferField::Inline(None));
        assert_eq!(classify(None), OfferField::Inline(None));
    }

    #[test]
    fn test_merge_round_trip_no_overrides() {
        let baseline = string_map(&[("name", "Free"), ("rateLimit", "100/s"), ("tier", "free")]);
        let row = string_map(&[("name", ""), ("tier", "")]);

        let merged = merge_fields(&baseline, &row);
        assert_eq!(merged, baseline);
    }

    #[test]
    fn test_merge_override_precedence() {
        let baseline = string_map(&[("rateLimit", "100/s"), ("tier", "free")]);
        let row = string_map(&[("tier", "free-eth")]);

        let merged = merge_fields(&baseline, &row);
        assert_eq!(merged["rateLimit"], "100/s");
        assert_eq!(merged["tier"], "free-eth");
    }

    #[test]
    fn test_empty_override_does_not_clobber_baseline() {
        let baseline = string_map(&[("tier", "free")]);
        // Both the empty string and the literal `null` count as absent.
        for absent in ["", "null", "NULL"] {
            let row = string_map(&[("tier", absent)]);
            let merged = merge_fields(&baseline, &row);
            assert_eq!(merged["tier"], "free", "override {absent:?} must not win");
        }
    }

    #[test]
    fn test_field_absent_everywhere_is_omitted() {
        let baseline = string_map(&[("tier", ""), ("name", "Free")]);
        let row = string_map(&[("tier", ""), ("wsUrl", "")]);

        let merged = merge_fields(&baseline, &row);
        assert!(merged.get("tier").is_none());
        assert!(merged.get("wsUrl").is_none());
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merged_field_order_baseline_then_row() {
        let baseline = string_map(&[("name", "Free"), ("rateLimit", "100/s")]);
        let row = string_map(&[("wsUrl", "wss://x"), ("name", "Custom")]);

        let merged = merge_fields(&baseline, &row);
        let keys: Vec<&String> = merged.keys().collect();
        assert_eq!(keys, vec!["name", "rateLimit", "wsUrl"]);
        assert_eq!(merged["name"], "Custom");
    }

    #[test]
    fn test_resolve_hydrates_from_offer() {
        let offers = rpc_offers(
            "provider,slug,name,rateLimit,tier\nalchemy,alchemy-free,Alchemy Free,100/s,free\n",
        );
        let listing = rpc_listing("offer,tier\n!offer:alchemy-free,free-eth\n", "ethereum");

        let (records, errors) = resolve_listing_file(&listing, &offers);
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.provider, "alchemy");
        assert_eq!(record.offer_id, "alchemy-free");
        assert_eq!(record.fields["name"], "Alchemy Free");
        assert_eq!(record.fields["rateLimit"], "100/s");
        assert_eq!(record.fields["tier"], "free-eth");
    }

    #[test]
    fn test_unresolved_reference_names_file_and_row() {
        let offers = rpc_offers("provider,slug,name\nalchemy,alchemy-free,Free\n");
        let listing = rpc_listing("offer\n!offer:nonexistent-slug\n", "ethereum");

        let (records, errors) = resolve_listing_file(&listing, &offers);
        assert!(records.is_empty(), "no partial merge for unresolved rows");
        assert_eq!(errors.len(), 1);
        let msg = errors[0].to_string();
        assert!(msg.contains("networks/ethereum/rpc.csv"));
        assert!(msg.contains("row 2"));
        assert!(msg.contains("!offer:nonexistent-slug"));
    }

    #[test]
    fn test_inline_listing_is_self_contained() {
        let offers = OfferTable::default();
        let listing = rpc_listing(
            "provider,name,url\nalchemy,Alchemy RPC,https://eth.example\n",
            "ethereum",
        );

        let (records, errors) = resolve_listing_file(&listing, &offers);
        assert!(errors.is_empty());
        let record = &records[0];
        assert_eq!(record.provider, "alchemy");
        assert_eq!(record.offer_id, "Alchemy RPC");
        assert_eq!(record.fields["url"], "https://eth.example");
        // Identity columns never leak into the payload.
        assert!(record.fields.get("provider").is_none());
    }

    #[test]
    fn test_reference_row_provider_comes_from_offer() {
        let offers = rpc_offers("provider,slug,name\nalchemy,alchemy-free,Free\n");
        // A provider cell on a reference row is identity bookkeeping; the
        // canonical offer decides ownership.
        let listing = rpc_listing("provider,offer\nsomeone-else,!offer:alchemy-free\n", "ethereum");

        let (records, _) = resolve_listing_file(&listing, &offers);
        assert_eq!(records[0].provider, "alchemy");
    }
}
