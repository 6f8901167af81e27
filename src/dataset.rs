//! Dataset discovery and the immutable lookup tables.
//!
//! Source tree layout:
//!
//! ```text
//! <root>/
//!   providers.csv                        identity table
//!   offers/<category>.csv                canonical offers per category
//!   networks/<network>/<category>.csv    network-specific listings
//!   networks/all/<category>.csv          all-networks listings
//! ```
//!
//! Loading is Phase 1 of the run: after `Dataset::load` returns, the provider
//! and offer tables are complete and are only ever read. They are passed by
//! reference into every later stage - no process-wide state, so runs are
//! reentrant and the stages testable in isolation.
//!
//! Duplicate keys are recorded in each table's `issues` during the build
//! (first row wins for lookups, so later stages still run) and surfaced by
//! the validator together with everything else.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DataError, PipelineError, PipelineResult};
use crate::loader::{self, Table};
use crate::merge::is_provided;
use crate::schema;

/// Directory name reserved for listings that apply to every network.
pub const ALL_NETWORKS_DIR: &str = "all";

// =============================================================================
// Network scope
// =============================================================================

/// Where a listing row came from: a concrete network directory, or the
/// `all` sentinel directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkScope {
    All,
    Network(String),
}

impl fmt::Display for NetworkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkScope::All => f.write_str(ALL_NETWORKS_DIR),
            NetworkScope::Network(name) => f.write_str(name),
        }
    }
}

// =============================================================================
// Provider table
// =============================================================================

/// One provider identity record.
#[derive(Debug, Clone)]
pub struct Provider {
    pub slug: String,
    pub row: usize,
    /// All columns except `slug`, in column order.
    pub fields: Map<String, Value>,
}

impl Provider {
    /// Logo filename, when the cell is actually filled in.
    pub fn logo(&self) -> Option<&str> {
        self.fields
            .get("logo")
            .and_then(Value::as_str)
            .filter(|v| is_provided(v))
    }
}

/// Providers keyed by slug. Immutable after build.
#[derive(Debug)]
pub struct ProviderTable {
    pub file: PathBuf,
    providers: Vec<Provider>,
    index: HashMap<String, usize>,
    /// Duplicates and ordering violations found while indexing.
    pub issues: Vec<DataError>,
}

impl ProviderTable {
    pub fn build(table: &Table) -> Self {
        let mut providers: Vec<Provider> = Vec::new();
        let mut index = HashMap::new();
        let mut issues = Vec::new();
        let mut previous: Option<String> = None;

        for row in &table.rows {
            let slug = row.get("slug").unwrap_or("").to_string();

            if let Some(prev) = &previous {
                if slug.as_str() < prev.as_str() {
                    issues.push(DataError::SlugOrder {
                        file: table.file.clone(),
                        row: row.line,
                        slug: slug.clone(),
                        previous: prev.clone(),
                    });
                }
            }
            previous = Some(slug.clone());

            if index.contains_key(&slug) {
                issues.push(DataError::DuplicateSlug {
                    file: table.file.clone(),
                    row: row.line,
                    slug,
                });
                continue;
            }

            let mut fields = Map::new();
            for (column, value) in &row.values {
                if column != "slug" {
                    fields.insert(column.clone(), value.clone());
                }
            }
            index.insert(slug.clone(), providers.len());
            providers.push(Provider {
                slug,
                row: row.line,
                fields,
            });
        }

        Self {
            file: table.file.clone(),
            providers,
            index,
            issues,
        }
    }

    pub fn get(&self, slug: &str) -> Option<&Provider> {
        self.index.get(slug).map(|&i| &self.providers[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// =============================================================================
// Offer table
// =============================================================================

/// One canonical offer: a reusable field set scoped to a category.
#[derive(Debug, Clone)]
pub struct Offer {
    /// Slug of the owning provider; resolution is checked by the validator.
    pub provider: String,
    pub slug: String,
    pub category: String,
    pub file: PathBuf,
    pub row: usize,
    /// Payload columns (everything except `provider` and `slug`), in
    /// column order. This is the hydration baseline for references.
    pub fields: Map<String, Value>,
}

/// Offers keyed by (category, slug). Immutable after build.
#[derive(Debug, Default)]
pub struct OfferTable {
    offers: Vec<Offer>,
    index: HashMap<(String, String), usize>,
    pub issues: Vec<DataError>,
}

impl OfferTable {
    pub fn build(tables: &[(String, Table)]) -> Self {
        let mut offers: Vec<Offer> = Vec::new();
        let mut index = HashMap::new();
        let mut issues = Vec::new();

        for (category, table) in tables {
            let mut previous: Option<String> = None;
            for row in &table.rows {
                let slug = row.get("slug").unwrap_or("").to_string();

                if let Some(prev) = &previous {
                    if slug.as_str() < prev.as_str() {
                        issues.push(DataError::SlugOrder {
                            file: table.file.clone(),
                            row: row.line,
                            slug: slug.clone(),
                            previous: prev.clone(),
                        });
                    }
                }
                previous = Some(slug.clone());

                let key = (category.clone(), slug.clone());
                if index.contains_key(&key) {
                    issues.push(DataError::DuplicateOffer {
                        file: table.file.clone(),
                        row: row.line,
                        category: category.clone(),
                        slug,
                    });
                    continue;
                }

                let mut fields = Map::new();
                for (column, value) in &row.values {
                    if column != "provider" && column != "slug" {
                        fields.insert(column.clone(), value.clone());
                    }
                }
                index.insert(key, offers.len());
                offers.push(Offer {
                    provider: row.get("provider").unwrap_or("").to_string(),
                    slug,
                    category: category.clone(),
                    file: table.file.clone(),
                    row: row.line,
                    fields,
                });
            }
        }

        Self {
            offers,
            index,
            issues,
        }
    }

    pub fn get(&self, category: &str, slug: &str) -> Option<&Offer> {
        self.index
            .get(&(category.to_string(), slug.to_string()))
            .map(|&i| &self.offers[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Offer> {
        self.offers.iter()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// One loaded listing source file.
#[derive(Debug)]
pub struct ListingFile {
    pub scope: NetworkScope,
    pub category: String,
    pub table: Table,
}

/// The fully loaded source tree: lookup tables plus raw listing rows.
#[derive(Debug)]
pub struct Dataset {
    pub root: PathBuf,
    pub providers: ProviderTable,
    pub offers: OfferTable,
    /// Listing files in deterministic order: networks sorted by name,
    /// categories in declared order.
    pub listings: Vec<ListingFile>,
    /// Concrete network names, sorted. The `all` sentinel is not a network.
    pub networks: Vec<String>,
}

impl Dataset {
    pub fn load(root: &Path) -> PipelineResult<Self> {
        let providers_table = loader::load_table(&root.join("providers.csv"))?;
        providers_table.require_columns(schema::PROVIDER_COLUMNS)?;
        let providers = ProviderTable::build(&providers_table);

        let mut offer_tables = Vec::new();
        let offers_dir = root.join("offers");
        if offers_dir.is_dir() {
            let present = csv_files(&offers_dir)?;
            for category in schema::CATEGORIES {
                let file_name = format!("{}.csv", category.name);
                if present.contains(&file_name) {
                    let table = loader::load_table(&offers_dir.join(&file_name))?;
                    table.require_columns(schema::OFFER_COLUMNS)?;
                    offer_tables.push((category.name.to_string(), table));
                }
            }
            warn_unknown(&offers_dir, &present);
        }
        let offers = OfferTable::build(&offer_tables);

        let mut listings = Vec::new();
        let mut networks = Vec::new();
        let networks_dir = root.join("networks");
        if networks_dir.is_dir() {
            for name in subdirectories(&networks_dir)? {
                let scope = if name == ALL_NETWORKS_DIR {
                    NetworkScope::All
                } else {
                    networks.push(name.clone());
                    NetworkScope::Network(name.clone())
                };

                let dir = networks_dir.join(&name);
                let present = csv_files(&dir)?;
                for category in schema::CATEGORIES {
                    let file_name = format!("{}.csv", category.name);
                    if present.contains(&file_name) {
                        listings.push(ListingFile {
                            scope: scope.clone(),
                            category: category.name.to_string(),
                            table: loader::load_table(&dir.join(&file_name))?,
                        });
                    }
                }
                warn_unknown(&dir, &present);
            }
        } else {
            log::warn!("no 'networks' directory under {}", root.display());
        }

        Ok(Self {
            root: root.to_path_buf(),
            providers,
            offers,
            listings,
            networks,
        })
    }
}

/// Subdirectory names, sorted for run-to-run determinism.
fn subdirectories(dir: &Path) -> PipelineResult<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if path.is_dir() && !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Names of the `.csv` files directly inside `dir`.
fn csv_files(dir: &Path) -> PipelineResult<HashSet<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "csv") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}

fn warn_unknown(dir: &Path, present: &HashSet<String>) {
    for name in present {
        let stem = name.trim_end_matches(".csv");
        if schema::category(stem).is_none() {
            log::warn!("{}: '{}' is not a known category, ignored", dir.display(), name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_table;
    use std::fs;
    use tempfile::tempdir;

    fn table(csv: &str, file: &str) -> Table {
        read_table(csv.as_bytes(), Path::new(file)).unwrap()
    }

    #[test]
    fn test_provider_table_indexing() {
        let t = table("slug,name,logo\nalchemy,Alchemy,alchemy.png\ninfura,Infura,\n", "providers.csv");
        let providers = ProviderTable::build(&t);

        assert_eq!(providers.len(), 2);
        assert!(providers.issues.is_empty());
        let alchemy = providers.get("alchemy").unwrap();
        assert_eq!(alchemy.logo(), Some("alchemy.png"));
        // Empty logo cell counts as absent.
        assert_eq!(providers.get("infura").unwrap().logo(), None);
        assert!(providers.get("nope").is_none());
    }

    #[test]
    fn test_duplicate_slug_collected_first_wins() {
        let t = table("slug,name\nalchemy,First\nalchemy,Second\n", "providers.csv");
        let providers = ProviderTable::build(&t);

        assert_eq!(providers.len(), 1);
        assert_eq!(providers.issues.len(), 1);
        assert!(matches!(providers.issues[0], DataError::DuplicateSlug { ref slug, row: 3, .. } if slug == "alchemy"));
        assert_eq!(
            providers.get("alchemy").unwrap().fields["name"],
            Value::String("First".into())
        );
    }

    #[test]
    fn test_slug_order_violation() {
        let t = table("slug,name\nzcash,Z\nalchemy,A\n", "providers.csv");
        let providers = ProviderTable::build(&t);
        assert_eq!(providers.issues.len(), 1);
        assert!(matches!(
            providers.issues[0],
            DataError::SlugOrder { ref slug, ref previous, .. } if slug == "alchemy" && previous == "zcash"
        ));
    }

    #[test]
    fn test_offer_table_key_is_category_and_slug() {
        let rpc = table("provider,slug,name\nalchemy,free,Free RPC\n", "offers/rpc.csv");
        let wallet = table("provider,slug,name\nalchemy,free,Free Wallet\n", "offers/wallet.csv");
        let offers = OfferTable::build(&[("rpc".into(), rpc), ("wallet".into(), wallet)]);

        assert_eq!(offers.len(), 2);
        assert!(offers.issues.is_empty());
        // Same slug in different categories is two distinct offers.
        assert_eq!(
            offers.get("rpc", "free").unwrap().fields["name"],
            Value::String("Free RPC".into())
        );
        assert_eq!(
            offers.get("wallet", "free").unwrap().fields["name"],
            Value::String("Free Wallet".into())
        );
    }

    #[test]
    fn test_duplicate_offer_collected() {
        let rpc = table("provider,slug,name\nalchemy,free,A\nalchemy,free,B\n", "offers/rpc.csv");
        let offers = OfferTable::build(&[("rpc".into(), rpc)]);
        assert_eq!(offers.len(), 1);
        assert!(matches!(offers.issues[0], DataError::DuplicateOffer { ref slug, .. } if slug == "free"));
    }

    #[test]
    fn test_offer_fields_exclude_identity_columns() {
        let rpc = table("provider,slug,name,tier\nalchemy,free,Free,community\n", "offers/rpc.csv");
        let offers = OfferTable::build(&[("rpc".into(), rpc)]);
        let offer = offers.get("rpc", "free").unwrap();
        assert!(offer.fields.get("provider").is_none());
        assert!(offer.fields.get("slug").is_none());
        let keys: Vec<&String> = offer.fields.keys().collect();
        assert_eq!(keys, vec!["name", "tier"]);
    }

    #[test]
    fn test_load_full_tree() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("providers.csv"), "slug,name,logo\nalchemy,Alchemy,alchemy.png\n").unwrap();
        fs::create_dir(root.join("offers")).unwrap();
        fs::write(root.join("offers/rpc.csv"), "provider,slug,name\nalchemy,free,Free\n").unwrap();
        fs::create_dir_all(root.join("networks/ethereum")).unwrap();
        fs::create_dir_all(root.join("networks/all")).unwrap();
        fs::write(root.join("networks/ethereum/rpc.csv"), "provider,name,offer\n,,!offer:free\n").unwrap();
        fs::write(root.join("networks/all/wallet.csv"), "provider,name\nalchemy,Alchemy Wallet\n").unwrap();

        let dataset = Dataset::load(root).unwrap();
        assert_eq!(dataset.networks, vec!["ethereum"]);
        assert_eq!(dataset.providers.len(), 1);
        assert_eq!(dataset.offers.len(), 1);
        assert_eq!(dataset.listings.len(), 2);
        // `all` sorts before `ethereum`, so its listing file comes first.
        assert_eq!(dataset.listings[0].scope, NetworkScope::All);
        assert_eq!(dataset.listings[0].category, "wallet");
        assert_eq!(dataset.listings[1].scope, NetworkScope::Network("ethereum".into()));
    }

    #[test]
    fn test_missing_providers_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = Dataset::load(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_unknown_category_files_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("providers.csv"), "slug,name\nalchemy,Alchemy\n").unwrap();
        fs::create_dir_all(root.join("networks/ethereum")).unwrap();
        fs::write(root.join("networks/ethereum/notes.csv"), "a,b\n1,2\n").unwrap();

        let dataset = Dataset::load(root).unwrap();
        assert!(dataset.listings.is_empty());
        assert_eq!(dataset.networks, vec!["ethereum"]);
    }
}
