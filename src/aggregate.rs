//! Cross-network aggregation of merged listings.
//!
//! Each network's output is the union of its own listings and every
//! all-networks listing. An all-networks listing contributes to every
//! network exactly once and is never deduplicated against a specific
//! listing for the same provider/offer - the data model treats them as
//! distinct listing instances. Ordering is stable: specific rows first in
//! source order, then all-networks rows in source order.

use std::collections::HashSet;

use crate::dataset::{ListingFile, NetworkScope};
use crate::merge::MergedRecord;
use crate::schema;

/// The final output unit: one ordered record collection per category, for
/// one network. Categories appear in declared order.
#[derive(Debug, Clone)]
pub struct NetworkArtifact {
    pub network: String,
    pub categories: Vec<(String, Vec<MergedRecord>)>,
}

/// Build every network's artifact from the merged records.
///
/// A category key is present in a network's artifact when a listing file
/// existed for it - in the network's own directory or in `all` - even if it
/// held no rows; categories with no source at all are omitted.
pub fn aggregate(
    networks: &[String],
    listings: &[ListingFile],
    merged: &[MergedRecord],
) -> Vec<NetworkArtifact> {
    let present: HashSet<(&NetworkScope, &str)> = listings
        .iter()
        .map(|l| (&l.scope, l.category.as_str()))
        .collect();

    let mut artifacts = Vec::new();
    for network in networks {
        let scope = NetworkScope::Network(network.clone());
        let mut categories = Vec::new();

        for category in schema::CATEGORIES {
            let has_specific = present.contains(&(&scope, category.name));
            let has_all = present.contains(&(&NetworkScope::All, category.name));
            if !has_specific && !has_all {
                continue;
            }

            let mut records: Vec<MergedRecord> = merged
                .iter()
                .filter(|r| r.category == category.name && r.scope == scope)
                .cloned()
                .collect();
            records.extend(
                merged
                    .iter()
                    .filter(|r| r.category == category.name && r.scope == NetworkScope::All)
                    .cloned(),
            );

            categories.push((category.name.to_string(), records));
        }

        artifacts.push(NetworkArtifact {
            network: network.clone(),
            categories,
        });
    }

    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_table;
    use serde_json::Map;
    use std::path::{Path, PathBuf};

    fn listing(scope: NetworkScope, category: &str) -> ListingFile {
        ListingFile {
            scope,
            category: category.into(),
            table: read_table("name\n".as_bytes(), Path::new("x.csv")).unwrap(),
        }
    }

    fn record(scope: NetworkScope, category: &str, offer_id: &str) -> MergedRecord {
        MergedRecord {
            provider: "alchemy".into(),
            category: category.into(),
            scope,
            offer_id: offer_id.into(),
            file: PathBuf::from("x.csv"),
            row: 2,
            fields: Map::new(),
        }
    }

    #[test]
    fn test_all_networks_propagates_to_every_network() {
        let networks = vec!["ethereum".to_string(), "polygon".to_string()];
        let listings = vec![listing(NetworkScope::All, "rpc")];
        let merged = vec![record(NetworkScope::All, "rpc", "shared")];

        let artifacts = aggregate(&networks, &listings, &merged);
        assert_eq!(artifacts.len(), 2);
        for artifact in &artifacts {
            let (name, records) = &artifact.categories[0];
            assert_eq!(name, "rpc");
            assert_eq!(records.len(), 1, "exactly once per network");
            assert_eq!(records[0].offer_id, "shared");
        }
    }

    #[test]
    fn test_specific_rows_precede_all_networks_rows() {
        let networks = vec!["ethereum".to_string()];
        let ethereum = NetworkScope::Network("ethereum".into());
        let listings = vec![
            listing(NetworkScope::All, "rpc"),
            listing(ethereum.clone(), "rpc"),
        ];
        let merged = vec![
            // Merged records arrive in dataset order: `all` sorts first.
            record(NetworkScope::All, "rpc", "shared"),
            record(ethereum.clone(), "rpc", "eth-only"),
        ];

        let artifacts = aggregate(&networks, &listings, &merged);
        let (_, records) = &artifacts[0].categories[0];
        assert_eq!(records[0].offer_id, "eth-only");
        assert_eq!(records[1].offer_id, "shared");
    }

    #[test]
    fn test_same_offer_in_both_scopes_is_not_deduplicated() {
        let networks = vec!["ethereum".to_string()];
        let ethereum = NetworkScope::Network("ethereum".into());
        let listings = vec![
            listing(NetworkScope::All, "rpc"),
            listing(ethereum.clone(), "rpc"),
        ];
        let merged = vec![
            record(NetworkScope::All, "rpc", "free"),
            record(ethereum.clone(), "rpc", "free"),
        ];

        let artifacts = aggregate(&networks, &listings, &merged);
        let (_, records) = &artifacts[0].categories[0];
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_category_present_only_when_sourced() {
        let networks = vec!["ethereum".to_string()];
        let ethereum = NetworkScope::Network("ethereum".into());
        // An empty listing file still creates the category key; absent
        // categories are omitted entirely.
        let listings = vec![listing(ethereum.clone(), "wallet")];

        let artifacts = aggregate(&networks, &listings, &[]);
        let keys: Vec<&String> = artifacts[0].categories.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["wallet"]);
    }

    #[test]
    fn test_categories_in_declared_order() {
        let networks = vec!["ethereum".to_string()];
        let ethereum = NetworkScope::Network("ethereum".into());
        let listings = vec![
            listing(ethereum.clone(), "wallet"),
            listing(ethereum.clone(), "rpc"),
        ];

        let artifacts = aggregate(&networks, &listings, &[]);
        let keys: Vec<&String> = artifacts[0].categories.iter().map(|(k, _)| k).collect();
        // rpc is declared before wallet, regardless of load order.
        assert_eq!(keys, vec!["rpc", "wallet"]);
    }
}
