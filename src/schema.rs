//! Declared per-category schemas for the source dataset.
//!
//! The source CSVs are loosely typed, so each service category declares its
//! field expectations here instead of scattering presence checks through the
//! merge logic. `required` fields must be present and non-empty on every
//! merged record of the category; `known` fields are documented optional
//! columns - anything outside both sets is accepted (the field set is open)
//! but logged, since it is usually a typo.

/// Declared schema for one service category.
#[derive(Debug, Clone, Copy)]
pub struct CategorySchema {
    /// Category name; doubles as the source file stem and the artifact key.
    pub name: &'static str,
    /// Fields that must be present and non-empty on every merged record.
    pub required: &'static [&'static str],
    /// Documented optional fields for the category.
    pub known: &'static [&'static str],
}

/// Fields shared by every category.
const COMMON_KNOWN: &[&str] = &["description", "url", "logo", "docs", "tags"];

/// All service categories, in artifact emission order.
///
/// `devTool` is spelled with its historical capital T; the file name and the
/// artifact key must match it exactly.
pub const CATEGORIES: &[CategorySchema] = &[
    CategorySchema {
        name: "rpc",
        required: &["name"],
        known: &["tier", "rateLimit", "wsUrl", "archive", "testnet"],
    },
    CategorySchema {
        name: "indexing",
        required: &["name"],
        known: &["graphql", "rest", "tier", "rateLimit"],
    },
    CategorySchema {
        name: "oracle",
        required: &["name"],
        known: &["feeds", "updateFrequency"],
    },
    CategorySchema {
        name: "bridge",
        required: &["name"],
        known: &["chains", "trustModel"],
    },
    CategorySchema {
        name: "explorer",
        required: &["name"],
        known: &["apiUrl", "testnet"],
    },
    CategorySchema {
        name: "faucet",
        required: &["name"],
        known: &["amount", "cooldown", "authRequired"],
    },
    CategorySchema {
        name: "analytic",
        required: &["name"],
        known: &["dashboards", "tier"],
    },
    CategorySchema {
        name: "wallet",
        required: &["name"],
        known: &["platforms", "custody", "hardware"],
    },
    CategorySchema {
        name: "devTool",
        required: &["name"],
        known: &["language", "package", "repository"],
    },
];

/// Identity columns the providers table must declare.
pub const PROVIDER_COLUMNS: &[&str] = &["slug", "name"];

/// Optional provider metadata columns.
pub const PROVIDER_KNOWN: &[&str] = &[
    "description",
    "logo",
    "website",
    "docs",
    "twitter",
    "github",
    "tags",
];

/// Identity columns every offers table must declare.
pub const OFFER_COLUMNS: &[&str] = &["provider", "slug"];

/// Look up a category schema by name (case-sensitive, like the file names).
pub fn category(name: &str) -> Option<&'static CategorySchema> {
    CATEGORIES.iter().find(|c| c.name == name)
}

/// True when `column` is declared (required or known) for `schema`.
pub fn is_declared(schema: &CategorySchema, column: &str) -> bool {
    schema.required.contains(&column)
        || schema.known.contains(&column)
        || COMMON_KNOWN.contains(&column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_categories_require_name() {
        for schema in CATEGORIES {
            assert!(
                schema.required.contains(&"name"),
                "category {} must require a display name",
                schema.name
            );
        }
    }

    #[test]
    fn test_category_lookup() {
        assert!(category("rpc").is_some());
        assert!(category("devTool").is_some());
        // Case matters: the file is devTool.csv, not devtool.csv.
        assert!(category("devtool").is_none());
        assert!(category("unknown").is_none());
    }

    #[test]
    fn test_declared_columns() {
        let rpc = category("rpc").unwrap();
        assert!(is_declared(rpc, "name"));
        assert!(is_declared(rpc, "rateLimit"));
        assert!(is_declared(rpc, "description")); // common
        assert!(!is_declared(rpc, "definitelyNotAColumn"));
    }
}
