//! Grant record schema
//!
//! One `GrantRecord` per funder-to-recipient transaction, exactly as it appears in
//! the source JSON. Values are kept as loaded; numeric coercion of `amount_usd` and
//! `year_issued` is the preprocessor's job, so a record never fails to load just
//! because one of its cells is not a number.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar cell from the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FieldValue {
    /// Textual form used when the record is flattened into a table row.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "null"),
        }
    }
}

macro_rules! grant_record {
    ($($field:ident),* $(,)?) => {
        /// One grant transaction. Field names match the source JSON keys.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct GrantRecord {
            $(pub $field: FieldValue,)*
        }

        /// Every `GrantRecord` field, in declaration (and column) order.
        pub const FIELD_NAMES: &[&str] = &[$(stringify!($field)),*];

        impl GrantRecord {
            /// Cell values in `FIELD_NAMES` order.
            pub fn values(&self) -> Vec<&FieldValue> {
                vec![$(&self.$field),*]
            }
        }
    };
}

grant_record! {
    funder_key,
    funder_profile_url,
    funder_name,
    funder_city,
    funder_state,
    funder_country,
    funder_type,
    funder_zipcode,
    funder_country_code,
    funder_ein,
    funder_gs_profile_update_level,
    recip_key,
    recip_name,
    recip_city,
    recip_state,
    recip_country,
    recip_zipcode,
    recip_country_code,
    recip_ein,
    recip_organization_code,
    recip_organization_tran,
    recip_gs_profile_link,
    recip_gs_profile_update_level,
    grant_key,
    amount_usd,
    grant_subject_code,
    grant_subject_tran,
    grant_population_code,
    grant_population_tran,
    grant_strategy_code,
    grant_strategy_tran,
    grant_transaction_code,
    grant_transaction_tran,
    grant_geo_area_code,
    grant_geo_area_tran,
    year_issued,
    grant_duration,
    grant_description,
    last_updated,
}

pub const GRANT_KEY_FIELD: &str = "grant_key";
pub const AMOUNT_FIELD: &str = "amount_usd";
pub const YEAR_FIELD: &str = "year_issued";
pub const DESCRIPTION_FIELD: &str = "grant_description";
pub const CLUSTER_FIELD: &str = "amount_usd_cluster";

const CODE_SUFFIX: &str = "_code";
const LABEL_SUFFIX: &str = "_tran";

/// A coded classification column and the label column that translates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLabelPair {
    pub code: &'static str,
    pub label: &'static str,
}

/// Paired coded/label fields, matched by shared base name, in field order.
///
/// Code columns without a `_tran` partner (country codes) are not classification
/// axes and are left untouched.
pub fn code_label_pairs() -> Vec<CodeLabelPair> {
    FIELD_NAMES
        .iter()
        .filter_map(|code| {
            let base = code.strip_suffix(CODE_SUFFIX)?;
            FIELD_NAMES
                .iter()
                .find(|label| label.strip_suffix(LABEL_SUFFIX) == Some(base))
                .map(|label| CodeLabelPair { code: *code, label: *label })
        })
        .collect()
}

impl GrantRecord {
    pub fn grant_key(&self) -> Option<String> {
        self.grant_key.as_text()
    }
}

/// Ordered collection of records from one source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantDataset {
    pub grants: Vec<GrantRecord>,
}

impl GrantDataset {
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
