//! Column-mapping resolver
//!
//! Tables reach the charts and prompt builders under different naming conventions:
//! the preprocessor emits label form ("Amount Usd"), raw exports keep snake_case
//! ("amount_usd"), and some spreadsheets use "Amount_Usd". Consumers ask for the
//! canonical label and get back whatever spelling the table actually carries.

use crate::error::{GrantScopeError, Result};
use polars::prelude::DataFrame;
use std::collections::HashMap;

pub const GRANT_KEY: &str = "Grant Key";
pub const AMOUNT_USD: &str = "Amount Usd";
pub const AMOUNT_USD_CLUSTER: &str = "Amount Usd Cluster";
pub const FUNDER_NAME: &str = "Funder Name";
pub const FUNDER_TYPE: &str = "Funder Type";
pub const FUNDER_STATE: &str = "Funder State";
pub const RECIP_NAME: &str = "Recip Name";
pub const GRANT_SUBJECT_TRAN: &str = "Grant Subject Tran";
pub const GRANT_POPULATION_TRAN: &str = "Grant Population Tran";
pub const GRANT_STRATEGY_TRAN: &str = "Grant Strategy Tran";
pub const YEAR_ISSUED: &str = "Year Issued";
pub const GRANT_DESCRIPTION: &str = "Grant Description";

/// Fields most pages need.
pub const DEFAULT_COLUMNS: &[&str] = &[
    GRANT_KEY,
    AMOUNT_USD,
    AMOUNT_USD_CLUSTER,
    FUNDER_NAME,
    FUNDER_TYPE,
    FUNDER_STATE,
    RECIP_NAME,
    GRANT_SUBJECT_TRAN,
    GRANT_POPULATION_TRAN,
    GRANT_STRATEGY_TRAN,
    YEAR_ISSUED,
    GRANT_DESCRIPTION,
];

/// Accepted spellings of a canonical label, in priority order.
pub fn spelling_variants(canonical: &str) -> [String; 3] {
    [
        canonical.to_string(),
        canonical.to_lowercase().replace(' ', "_"),
        canonical.replace(' ', "_"),
    ]
}

/// Canonical label -> actual column name for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: HashMap<String, String>,
}

impl ColumnMapping {
    pub fn get(&self, canonical: &str) -> Result<&str> {
        self.columns
            .get(canonical)
            .map(String::as_str)
            .ok_or_else(|| GrantScopeError::UnresolvedColumn {
                canonical: canonical.to_string(),
                suggestion: None,
            })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub fn resolve(table: &DataFrame, canonical_names: &[&str]) -> Result<ColumnMapping> {
    let available = table.get_column_names();
    resolve_names(&available, canonical_names)
}

pub fn resolve_column(table: &DataFrame, canonical: &str) -> Result<String> {
    let mapping = resolve(table, &[canonical])?;
    Ok(mapping.get(canonical)?.to_string())
}

pub(crate) fn resolve_names(available: &[&str], canonical_names: &[&str]) -> Result<ColumnMapping> {
    let mut columns = HashMap::new();

    for canonical in canonical_names {
        let found = spelling_variants(canonical)
            .into_iter()
            .find(|variant| available.contains(&variant.as_str()));

        match found {
            Some(actual) => {
                columns.insert(canonical.to_string(), actual);
            }
            None => {
                return Err(GrantScopeError::UnresolvedColumn {
                    canonical: canonical.to_string(),
                    suggestion: closest_column(available, canonical),
                });
            }
        }
    }

    Ok(ColumnMapping { columns })
}

/// Nearest existing column, for the error message only.
fn closest_column(available: &[&str], canonical: &str) -> Option<String> {
    let target = canonical.to_lowercase().replace('_', " ");
    available
        .iter()
        .map(|name| {
            let score = strsim::jaro_winkler(&name.to_lowercase().replace('_', " "), &target);
            (*name, score)
        })
        .filter(|(_, score)| *score > 0.85)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_variants_in_priority_order() {
        assert_eq!(
            spelling_variants("Grant Key"),
            ["Grant Key".to_string(), "grant_key".to_string(), "Grant_Key".to_string()]
        );
    }

    #[test]
    fn test_resolves_snake_case() {
        let df = df![
            "grant_key" => ["A"],
            "Amount_Usd" => [10.0],
        ]
        .unwrap();

        let mapping = resolve(&df, &[GRANT_KEY, AMOUNT_USD]).unwrap();
        assert_eq!(mapping.get(GRANT_KEY).unwrap(), "grant_key");
        assert_eq!(mapping.get(AMOUNT_USD).unwrap(), "Amount_Usd");
    }

    #[test]
    fn test_label_form_wins_over_other_spellings() {
        let available = ["grant_key", "Grant Key"];
        let mapping = resolve_names(&available, &[GRANT_KEY]).unwrap();
        assert_eq!(mapping.get(GRANT_KEY).unwrap(), "Grant Key");
    }

    #[test]
    fn test_unresolved_names_the_field() {
        let available = ["Grant Key", "Funder Typ"];
        match resolve_names(&available, &[GRANT_KEY, FUNDER_TYPE]).unwrap_err() {
            GrantScopeError::UnresolvedColumn { canonical, suggestion } => {
                assert_eq!(canonical, "Funder Type");
                assert_eq!(suggestion.as_deref(), Some("Funder Typ"));
            }
            other => panic!("expected unresolved column, got {:?}", other),
        }
    }

    #[test]
    fn test_mapping_get_unknown_canonical() {
        let mapping = resolve_names(&["Grant Key"], &[GRANT_KEY]).unwrap();
        assert!(mapping.get(FUNDER_NAME).is_err());
    }
}
