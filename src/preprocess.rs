//! Preprocessor - turns a `GrantDataset` into the analysis and grouped tables.
//!
//! Steps run in a fixed order because the median fill must see the pre-explosion
//! row set and deduplication must see the post-explosion one:
//! 1. flatten records into a frame of text columns
//! 2. coerce `year_issued` (invalid -> 0) and `amount_usd` (invalid -> row dropped)
//! 3. fill numeric nulls with the column median
//! 4. fill categorical nulls with "Unknown"
//! 5. explode each code/label pair, zipped within the pair
//! 6. fill null descriptions with ""
//! 7. bucket amounts into `amount_usd_cluster`
//! 8. drop duplicate (year, grant, classification) rows
//! 9. take the first row per grant key as the grouped table
//! 10. rename columns to label form

use crate::error::Result;
use crate::record::{
    code_label_pairs, CodeLabelPair, GrantDataset, AMOUNT_FIELD, CLUSTER_FIELD,
    DESCRIPTION_FIELD, FIELD_NAMES, GRANT_KEY_FIELD, YEAR_FIELD,
};
use polars::prelude::*;
use tracing::{debug, info};

/// Placeholder for absent categorical values.
pub const UNKNOWN: &str = "Unknown";

const CODE_DELIMITER: char = ';';

/// Lower bound (inclusive) and label of each amount bucket, ascending.
pub const AMOUNT_CLUSTERS: [(f64, &str); 5] = [
    (0.0, "0-50k"),
    (50_000.0, "50k-100k"),
    (100_000.0, "100k-500k"),
    (500_000.0, "500k-1M"),
    (1_000_000.0, "1M+"),
];

/// The exploded table and the one-row-per-grant table.
#[derive(Debug, Clone)]
pub struct PreprocessedTables {
    pub analysis: DataFrame,
    pub grouped: DataFrame,
}

impl PreprocessedTables {
    pub fn into_parts(self) -> (DataFrame, DataFrame) {
        (self.analysis, self.grouped)
    }
}

pub fn preprocess(dataset: &GrantDataset) -> Result<PreprocessedTables> {
    let pairs = code_label_pairs();

    let df = records_to_frame(dataset)?;
    let df = coerce_numeric_fields(df)?;
    let df = fill_missing(df)?;

    let mut df = df;
    if df.height() > 0 {
        for pair in &pairs {
            df = explode_pair(df, pair)?;
        }
    }
    debug!("Exploded {} code/label pair(s) into {} row(s)", pairs.len(), df.height());

    let df = df
        .lazy()
        .with_columns([
            col(DESCRIPTION_FIELD).fill_null(lit("")),
            amount_cluster_expr().alias(CLUSTER_FIELD),
        ])
        .collect()?;

    let mut dedup_subset = vec![YEAR_FIELD.to_string(), GRANT_KEY_FIELD.to_string()];
    for pair in &pairs {
        dedup_subset.push(pair.code.to_string());
        dedup_subset.push(pair.label.to_string());
    }
    let mut analysis = df.unique_stable(Some(&dedup_subset), UniqueKeepStrategy::First, None)?;

    let mut grouped = analysis.unique_stable(
        Some(&[GRANT_KEY_FIELD.to_string()]),
        UniqueKeepStrategy::First,
        None,
    )?;

    rename_to_labels(&mut analysis)?;
    rename_to_labels(&mut grouped)?;

    info!(
        "Preprocessed {} grant(s) into {} analysis row(s) and {} grouped row(s)",
        dataset.len(),
        analysis.height(),
        grouped.height()
    );

    Ok(PreprocessedTables { analysis, grouped })
}

/// "amount_usd" -> "Amount Usd"
pub fn clean_label(label: &str) -> String {
    label
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Bucket label for an amount; `None` for negative or NaN amounts.
pub fn amount_cluster(amount: f64) -> Option<&'static str> {
    AMOUNT_CLUSTERS
        .iter()
        .rev()
        .find(|(lower, _)| amount >= *lower)
        .map(|(_, label)| *label)
}

fn amount_cluster_expr() -> Expr {
    AMOUNT_CLUSTERS
        .iter()
        .fold(lit(UNKNOWN), |otherwise, (lower, label)| {
            when(col(AMOUNT_FIELD).gt_eq(lit(*lower)))
                .then(lit(*label))
                .otherwise(otherwise)
        })
}

fn records_to_frame(dataset: &GrantDataset) -> Result<DataFrame> {
    let rows: Vec<_> = dataset.grants.iter().map(|grant| grant.values()).collect();

    let columns: Vec<Series> = FIELD_NAMES
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<Option<String>> = rows.iter().map(|row| row[idx].as_text()).collect();
            Series::new(name, values)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

fn coerce_numeric_fields(df: DataFrame) -> Result<DataFrame> {
    let before = df.height();

    let df = df
        .lazy()
        .with_columns([
            col(YEAR_FIELD)
                .cast(DataType::Float64)
                .cast(DataType::Int64)
                .fill_null(lit(0i64)),
            col(AMOUNT_FIELD).cast(DataType::Float64),
        ])
        .filter(
            col(AMOUNT_FIELD)
                .is_not_null()
                .and(col(AMOUNT_FIELD).is_not_nan()),
        )
        .collect()?;

    let dropped = before - df.height();
    if dropped > 0 {
        info!("Dropped {} grant row(s) with a non-numeric amount_usd", dropped);
    }
    Ok(df)
}

fn fill_missing(df: DataFrame) -> Result<DataFrame> {
    let mut fills = Vec::new();
    for series in df.get_columns() {
        let name = series.name();
        if series.dtype().is_numeric() {
            fills.push(
                col(name)
                    .fill_null(col(name).median())
                    .cast(series.dtype().clone()),
            );
        } else if matches!(series.dtype(), DataType::String) && name != DESCRIPTION_FIELD {
            fills.push(col(name).fill_null(lit(UNKNOWN)));
        }
    }

    Ok(df.lazy().with_columns(fills).collect()?)
}

fn explode_pair(df: DataFrame, pair: &CodeLabelPair) -> Result<DataFrame> {
    let (code_lists, label_lists): (Vec<Series>, Vec<Series>) = {
        let codes = df.column(pair.code)?.str()?;
        let labels = df.column(pair.label)?.str()?;
        codes
            .into_iter()
            .zip(labels.into_iter())
            .map(|(code, label)| {
                let (codes, labels) = pair_cells(code, label);
                (Series::new("", codes), Series::new("", labels))
            })
            .unzip()
    };

    let mut df = df;
    df.with_column(Series::new(pair.code, code_lists))?;
    df.with_column(Series::new(pair.label, label_lists))?;
    Ok(df.explode([pair.code, pair.label])?)
}

/// Split a `;`-delimited cell. Absent or blank cells yield `["Unknown"]`.
pub(crate) fn split_codes(cell: Option<&str>) -> Vec<String> {
    match cell.map(str::trim) {
        Some(text) if !text.is_empty() => text
            .split(CODE_DELIMITER)
            .map(|part| match part.trim() {
                "" => UNKNOWN.to_string(),
                value => value.to_string(),
            })
            .collect(),
        _ => vec![UNKNOWN.to_string()],
    }
}

/// Split both cells of a pair and pad the shorter list with "Unknown" so the
/// i-th code lines up with the i-th label.
pub(crate) fn pair_cells(code: Option<&str>, label: Option<&str>) -> (Vec<String>, Vec<String>) {
    let mut codes = split_codes(code);
    let mut labels = split_codes(label);
    let width = codes.len().max(labels.len());
    codes.resize(width, UNKNOWN.to_string());
    labels.resize(width, UNKNOWN.to_string());
    (codes, labels)
}

fn rename_to_labels(df: &mut DataFrame) -> Result<()> {
    let labels: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| clean_label(name))
        .collect();
    df.set_column_names(&labels)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("amount_usd"), "Amount Usd");
        assert_eq!(clean_label("grant_geo_area_tran"), "Grant Geo Area Tran");
        assert_eq!(clean_label("funder_EIN"), "Funder Ein");
        assert_eq!(clean_label("Grant Key"), "Grant key");
    }

    #[test]
    fn test_amount_cluster_edges() {
        assert_eq!(amount_cluster(0.0), Some("0-50k"));
        assert_eq!(amount_cluster(49_999.0), Some("0-50k"));
        assert_eq!(amount_cluster(50_000.0), Some("50k-100k"));
        assert_eq!(amount_cluster(100_000.0), Some("100k-500k"));
        assert_eq!(amount_cluster(999_999.99), Some("500k-1M"));
        assert_eq!(amount_cluster(1_000_000.0), Some("1M+"));
        assert_eq!(amount_cluster(2_000_000.0), Some("1M+"));
        assert_eq!(amount_cluster(-5.0), None);
        assert_eq!(amount_cluster(f64::NAN), None);
    }

    #[test]
    fn test_split_codes() {
        assert_eq!(split_codes(Some("1;2")), vec!["1", "2"]);
        assert_eq!(split_codes(Some(" SA ; SB ")), vec!["SA", "SB"]);
        assert_eq!(split_codes(Some("")), vec![UNKNOWN]);
        assert_eq!(split_codes(None), vec![UNKNOWN]);
        assert_eq!(split_codes(Some("1;")), vec!["1", UNKNOWN]);
    }

    #[test]
    fn test_pair_cells_pads_shorter_side() {
        let (codes, labels) = pair_cells(Some("1;2;3"), Some("Health;Education"));
        assert_eq!(codes, vec!["1", "2", "3"]);
        assert_eq!(labels, vec!["Health", "Education", UNKNOWN]);

        let (codes, labels) = pair_cells(None, Some("Health"));
        assert_eq!(codes, vec![UNKNOWN]);
        assert_eq!(labels, vec!["Health"]);
    }

    #[test]
    fn test_empty_dataset_produces_empty_tables() {
        let tables = preprocess(&GrantDataset::default()).unwrap();
        assert_eq!(tables.analysis.height(), 0);
        assert_eq!(tables.grouped.height(), 0);
        assert!(tables
            .analysis
            .get_column_names()
            .contains(&"Amount Usd Cluster"));
    }
}
