//! Chart-ready aggregations.
//!
//! Amount totals are computed over unique grants (first row per Grant Key) so a
//! grant exploded into several classification rows is only counted once.

use crate::columns::{
    ColumnMapping, AMOUNT_USD, AMOUNT_USD_CLUSTER, FUNDER_NAME, FUNDER_TYPE, GRANT_DESCRIPTION,
    GRANT_KEY, GRANT_SUBJECT_TRAN, RECIP_NAME, YEAR_ISSUED,
};
use crate::data_utils::{
    ascending_stable, column_mean, column_median, column_sum, count_values, descending_stable,
    f64_range, i64_range, i64_values, in_values, n_unique, row_limit, safe_divide, string_values,
    top_values,
};
use crate::error::Result;
use crate::preprocess::AMOUNT_CLUSTERS;
use itertools::Itertools;
use lazy_static::lazy_static;
use polars::prelude::*;
use serde::Serialize;

lazy_static! {
    static ref STOPWORDS: Series = Series::new(
        "stopwords",
        [
            "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
            "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
            "both", "but", "by", "can", "did", "do", "does", "doing", "down", "during", "each",
            "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here",
            "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it",
            "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not",
            "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
            "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that",
            "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
            "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we",
            "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
            "with", "you", "your", "yours", "yourself", "yourselves",
        ]
    );
}

const WORD_PATTERN: &str = r"[a-z0-9]+";

const TOTAL_ALIAS: &str = "__total";
const COUNT_ALIAS: &str = "__count";
const NODE_ALIAS: &str = "__node";
const ORDER_ALIAS: &str = "__order";
const ROW_ALIAS: &str = "__row";
const SOURCE_ALIAS: &str = "__source";
const TARGET_ALIAS: &str = "__target";
const WORD_ALIAS: &str = "__word";

/// Treemap label that selects every amount cluster.
pub const ALL_CLUSTERS: &str = "All";

/// Funders, recipients and subjects listed in block insights.
pub const BLOCK_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub total_grants: usize,
    pub total_amount: f64,
    pub unique_funders: usize,
    pub unique_recipients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunderTypeShare {
    pub funder_type: String,
    pub total_amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTotal {
    pub year: i64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    pub cluster: String,
    pub grant_count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub unique_grants: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub total_connections: usize,
    pub most_connected_node: Option<String>,
    pub most_connected_node_connections: usize,
    pub isolated_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationTotal {
    pub first: String,
    pub second: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearMean {
    pub year: i64,
    pub mean_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearClusterCount {
    pub year: i64,
    pub cluster: String,
    pub grant_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearCategoryTotal {
    pub year: i64,
    pub category: String,
    pub total_amount: f64,
}

/// Inclusive year and amount bounds of the scatter view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmountWindow {
    pub start_year: i64,
    pub end_year: i64,
    pub min_amount: f64,
    pub max_amount: f64,
}

impl AmountWindow {
    /// The window spanning every year and amount in `df`.
    pub fn covering(df: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        let (start_year, end_year) = i64_range(df, mapping.get(YEAR_ISSUED)?)?.unwrap_or((0, 0));
        let (min_amount, max_amount) = f64_range(df, mapping.get(AMOUNT_USD)?)?.unwrap_or((0.0, 0.0));
        Ok(Self { start_year, end_year, min_amount, max_amount })
    }
}

/// Detail panel for one treemap block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockInsights {
    pub total_grants: usize,
    pub total_amount: f64,
    pub average_amount: f64,
    pub median_amount: f64,
    pub top_funders: Vec<CategoryTotal>,
    pub top_recipients: Vec<CategoryTotal>,
    pub year_range: Option<(i64, i64)>,
    pub top_subjects: Vec<(String, usize)>,
}

impl BlockInsights {
    /// "2019 - 2021"
    pub fn year_range_label(&self) -> String {
        match self.year_range {
            Some((min, max)) => format!("{} - {}", min, max),
            None => "N/A".to_string(),
        }
    }
}

/// First row per grant.
pub fn unique_grants(df: &DataFrame, mapping: &ColumnMapping) -> Result<DataFrame> {
    let key = mapping.get(GRANT_KEY)?;
    Ok(df.unique_stable(Some(&[key.to_string()]), UniqueKeepStrategy::First, None)?)
}

pub fn summary_metrics(df: &DataFrame, mapping: &ColumnMapping) -> Result<SummaryMetrics> {
    let grants = unique_grants(df, mapping)?;
    Ok(SummaryMetrics {
        total_grants: grants.height(),
        total_amount: column_sum(&grants, mapping.get(AMOUNT_USD)?)?,
        unique_funders: n_unique(df, mapping.get(FUNDER_NAME)?)?,
        unique_recipients: n_unique(df, mapping.get(RECIP_NAME)?)?,
    })
}

fn amount_sum(amount: &str) -> Expr {
    col(amount).cast(DataType::Float64).sum()
}

fn amount_mean(amount: &str) -> Expr {
    col(amount).cast(DataType::Float64).mean()
}

/// One `CategoryTotal` per distinct value of `group`, holding `value`
/// aggregated over the group and ordered by that aggregate.
fn aggregate_by(
    plan: LazyFrame,
    group: &str,
    value: Expr,
    order: SortMultipleOptions,
    n: Option<usize>,
) -> Result<Vec<CategoryTotal>> {
    let mut plan = plan
        .filter(col(group).is_not_null())
        .group_by_stable([col(group).cast(DataType::String)])
        .agg([value.alias(TOTAL_ALIAS)])
        .sort([TOTAL_ALIAS], order);
    if let Some(n) = n {
        plan = plan.limit(row_limit(n));
    }
    category_totals(&plan.collect()?, group)
}

fn category_totals(frame: &DataFrame, key: &str) -> Result<Vec<CategoryTotal>> {
    let totals = frame.column(TOTAL_ALIAS)?.cast(&DataType::Float64)?;
    Ok(string_values(frame, key)?
        .into_iter()
        .zip(totals.f64()?.into_iter())
        .map(|(category, total)| CategoryTotal {
            category: category.unwrap_or_default(),
            total_amount: total.unwrap_or(0.0),
        })
        .collect())
}

pub fn top_funders(df: &DataFrame, mapping: &ColumnMapping, n: usize) -> Result<Vec<CategoryTotal>> {
    let grants = unique_grants(df, mapping)?;
    aggregate_by(
        grants.lazy(),
        mapping.get(FUNDER_NAME)?,
        amount_sum(mapping.get(AMOUNT_USD)?),
        descending_stable(),
        Some(n),
    )
}

pub fn top_subject_areas(df: &DataFrame, mapping: &ColumnMapping, n: usize) -> Result<Vec<CategoryTotal>> {
    let grants = unique_grants(df, mapping)?;
    aggregate_by(
        grants.lazy(),
        mapping.get(GRANT_SUBJECT_TRAN)?,
        amount_sum(mapping.get(AMOUNT_USD)?),
        descending_stable(),
        Some(n),
    )
}

pub fn funder_type_distribution(df: &DataFrame, mapping: &ColumnMapping) -> Result<Vec<FunderTypeShare>> {
    let grants = unique_grants(df, mapping)?;
    let totals = aggregate_by(
        grants.lazy(),
        mapping.get(FUNDER_TYPE)?,
        amount_sum(mapping.get(AMOUNT_USD)?),
        descending_stable(),
        None,
    )?;
    let overall: f64 = totals.iter().map(|entry| entry.total_amount).sum();

    Ok(totals
        .into_iter()
        .map(|entry| FunderTypeShare {
            percentage: safe_divide(entry.total_amount, overall) * 100.0,
            funder_type: entry.category,
            total_amount: entry.total_amount,
        })
        .collect())
}

/// `value` aggregated per year, ascending by year. Rows whose year does not
/// parse as an integer are skipped.
fn per_year(df: &DataFrame, year: &str, value: Expr) -> Result<Vec<(i64, f64)>> {
    let frame = df
        .clone()
        .lazy()
        .with_column(col(year).cast(DataType::Int64))
        .filter(col(year).is_not_null())
        .group_by([col(year)])
        .agg([value.alias(TOTAL_ALIAS)])
        .sort([year], SortMultipleOptions::default())
        .collect()?;

    let totals = frame.column(TOTAL_ALIAS)?.cast(&DataType::Float64)?;
    Ok(i64_values(&frame, year)?
        .into_iter()
        .zip(totals.f64()?.into_iter())
        .filter_map(|(year, total)| year.map(|year| (year, total.unwrap_or(0.0))))
        .collect())
}

/// Summed amount per year, ascending. Uses every row it is given; pass unique
/// grants to avoid counting exploded rows twice.
pub fn amount_by_year(df: &DataFrame, mapping: &ColumnMapping) -> Result<Vec<YearTotal>> {
    let totals = per_year(df, mapping.get(YEAR_ISSUED)?, amount_sum(mapping.get(AMOUNT_USD)?))?;
    Ok(totals
        .into_iter()
        .map(|(year, total_amount)| YearTotal { year, total_amount })
        .collect())
}

/// Grant count and summed amount per selected cluster, in bucket order.
pub fn cluster_statistics(
    df: &DataFrame,
    mapping: &ColumnMapping,
    selected_clusters: &[String],
) -> Result<Vec<ClusterStats>> {
    let cluster_column = mapping.get(AMOUNT_USD_CLUSTER)?;
    let found = df
        .clone()
        .lazy()
        .filter(in_values(cluster_column, selected_clusters))
        .group_by([col(cluster_column).cast(DataType::String)])
        .agg([
            len().alias(COUNT_ALIAS),
            amount_sum(mapping.get(AMOUNT_USD)?).alias(TOTAL_ALIAS),
        ])
        .collect()?;

    let totals = found.column(TOTAL_ALIAS)?.cast(&DataType::Float64)?;
    let found: Vec<(Option<String>, usize, f64)> = string_values(&found, cluster_column)?
        .into_iter()
        .zip(count_values(&found, COUNT_ALIAS)?)
        .zip(totals.f64()?.into_iter())
        .map(|((cluster, count), total)| (cluster, count, total.unwrap_or(0.0)))
        .collect();

    Ok(AMOUNT_CLUSTERS
        .iter()
        .map(|(_, label)| label.to_string())
        .filter(|label| selected_clusters.contains(label))
        .map(|cluster| {
            let (grant_count, total_amount) = found
                .iter()
                .find(|(label, _, _)| label.as_deref() == Some(cluster.as_str()))
                .map(|(_, count, total)| (*count, *total))
                .unwrap_or((0, 0.0));
            ClusterStats { cluster, grant_count, total_amount }
        })
        .collect())
}

/// Unique grants per category value, highest first.
pub fn top_categories(
    df: &DataFrame,
    mapping: &ColumnMapping,
    column: &str,
    n: usize,
) -> Result<Vec<CategoryCount>> {
    let key = mapping.get(GRANT_KEY)?;
    let counts = df
        .clone()
        .lazy()
        .select([
            col(column).cast(DataType::String),
            col(key).cast(DataType::String),
        ])
        .filter(col(column).is_not_null().and(col(key).is_not_null()))
        .group_by_stable([col(column)])
        .agg([col(key).n_unique().alias(COUNT_ALIAS)])
        .sort([COUNT_ALIAS], descending_stable())
        .limit(row_limit(n))
        .collect()?;

    Ok(string_values(&counts, column)?
        .into_iter()
        .zip(count_values(&counts, COUNT_ALIAS)?)
        .map(|(category, unique_grants)| CategoryCount {
            category: category.unwrap_or_default(),
            unique_grants,
        })
        .collect())
}

/// Funder/recipient graph statistics over distinct (funder, recipient) edges.
///
/// Nodes are ordered by first appearance, funder before recipient within a
/// row; the most connected node is the earliest one with the highest degree.
pub fn network_statistics(df: &DataFrame, mapping: &ColumnMapping) -> Result<NetworkStats> {
    let pairs = df
        .clone()
        .lazy()
        .select([
            col(mapping.get(FUNDER_NAME)?).cast(DataType::String).alias(SOURCE_ALIAS),
            col(mapping.get(RECIP_NAME)?).cast(DataType::String).alias(TARGET_ALIAS),
        ])
        .filter(col(SOURCE_ALIAS).is_not_null().and(col(TARGET_ALIAS).is_not_null()))
        .with_row_index(ROW_ALIAS, None)
        .with_column(col(ROW_ALIAS).cast(DataType::Int64));

    let nodes = concat(
        [
            pairs.clone().select([
                col(SOURCE_ALIAS).alias(NODE_ALIAS),
                (col(ROW_ALIAS) * lit(2i64)).alias(ORDER_ALIAS),
            ]),
            pairs.clone().select([
                col(TARGET_ALIAS).alias(NODE_ALIAS),
                (col(ROW_ALIAS) * lit(2i64) + lit(1i64)).alias(ORDER_ALIAS),
            ]),
        ],
        UnionArgs::default(),
    )?
    .sort([ORDER_ALIAS], SortMultipleOptions::default())
    .unique_stable(Some(vec![NODE_ALIAS.to_string()]), UniqueKeepStrategy::First)
    .select([col(NODE_ALIAS)]);

    let edges = pairs
        .filter(col(SOURCE_ALIAS).neq(col(TARGET_ALIAS)))
        .select([col(SOURCE_ALIAS), col(TARGET_ALIAS)])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;

    let degrees = concat(
        [
            edges.clone().lazy().select([col(SOURCE_ALIAS).alias(NODE_ALIAS)]),
            edges.clone().lazy().select([col(TARGET_ALIAS).alias(NODE_ALIAS)]),
        ],
        UnionArgs::default(),
    )?
    .group_by([col(NODE_ALIAS)])
    .agg([len().alias(COUNT_ALIAS)]);

    let nodes = nodes
        .left_join(degrees, col(NODE_ALIAS), col(NODE_ALIAS))
        .select([
            col(NODE_ALIAS),
            col(COUNT_ALIAS).cast(DataType::Int64).fill_null(lit(0i64)),
        ])
        .collect()?;

    let leader = nodes
        .clone()
        .lazy()
        .sort([COUNT_ALIAS], descending_stable())
        .limit(1)
        .collect()?;
    let isolated = nodes
        .clone()
        .lazy()
        .filter(col(COUNT_ALIAS).eq(lit(0i64)))
        .collect()?;

    Ok(NetworkStats {
        total_nodes: nodes.height(),
        total_connections: edges.height(),
        most_connected_node: string_values(&leader, NODE_ALIAS)?.into_iter().next().flatten(),
        most_connected_node_connections: count_values(&leader, COUNT_ALIAS)?
            .into_iter()
            .next()
            .unwrap_or(0),
        isolated_nodes: isolated.height(),
    })
}

/// Most frequent description words, excluding English stopwords. Ties keep
/// first-appearance order.
pub fn description_word_frequencies(
    df: &DataFrame,
    mapping: &ColumnMapping,
    n: usize,
) -> Result<Vec<(String, usize)>> {
    let words = df
        .clone()
        .lazy()
        .select([col(mapping.get(GRANT_DESCRIPTION)?)
            .cast(DataType::String)
            .str()
            .to_lowercase()
            .str()
            .extract_all(lit(WORD_PATTERN))
            .alias(WORD_ALIAS)])
        .explode([col(WORD_ALIAS)])
        .filter(
            col(WORD_ALIAS)
                .is_not_null()
                .and(col(WORD_ALIAS).is_in(lit(STOPWORDS.clone())).not()),
        )
        .group_by_stable([col(WORD_ALIAS)])
        .agg([len().alias(COUNT_ALIAS)])
        .sort([COUNT_ALIAS], descending_stable())
        .limit(row_limit(n))
        .collect()?;

    Ok(string_values(&words, WORD_ALIAS)?
        .into_iter()
        .zip(count_values(&words, COUNT_ALIAS)?)
        .map(|(word, count)| (word.unwrap_or_default(), count))
        .collect())
}

/// Rows whose `first` value is in `first_values` and whose `second` value is
/// in `second_values`.
pub fn filter_dimensions(
    df: &DataFrame,
    first: &str,
    first_values: &[String],
    second: &str,
    second_values: &[String],
) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .filter(in_values(first, first_values).and(in_values(second, second_values)))
        .collect()?)
}

/// Heatmap grid: one row per selected `first` value (ascending), one column
/// per `second` value present (ascending), cells holding the summed amount.
/// Combinations with no grants are 0.
pub fn heatmap_matrix(
    df: &DataFrame,
    mapping: &ColumnMapping,
    first: &str,
    first_values: &[String],
    second: &str,
    second_values: &[String],
) -> Result<DataFrame> {
    let amount = mapping.get(AMOUNT_USD)?;
    let filtered = filter_dimensions(df, first, first_values, second, second_values)?
        .lazy()
        .select([
            col(first).cast(DataType::String),
            col(second).cast(DataType::String),
            col(amount).cast(DataType::Float64),
        ])
        .collect()?;

    let present = filtered
        .clone()
        .lazy()
        .select([col(second)])
        .unique_stable(None, UniqueKeepStrategy::First)
        .sort([second], SortMultipleOptions::default())
        .collect()?;
    let cells: Vec<Expr> = string_values(&present, second)?
        .into_iter()
        .flatten()
        .map(|value| {
            col(amount)
                .filter(col(second).eq(lit(value.as_str())))
                .sum()
                .fill_null(lit(0.0))
                .alias(&value)
        })
        .collect();

    if cells.is_empty() {
        return Ok(filtered.select([first])?);
    }
    Ok(filtered
        .lazy()
        .group_by([col(first)])
        .agg(cells)
        .sort([first], SortMultipleOptions::default())
        .collect()?)
}

/// Largest (first, second) amount combinations, highest first.
pub fn top_combinations(
    df: &DataFrame,
    mapping: &ColumnMapping,
    first: &str,
    second: &str,
    n: usize,
) -> Result<Vec<CombinationTotal>> {
    let totals = df
        .clone()
        .lazy()
        .select([
            col(first).cast(DataType::String),
            col(second).cast(DataType::String),
            col(mapping.get(AMOUNT_USD)?).cast(DataType::Float64).alias(TOTAL_ALIAS),
        ])
        .filter(col(first).is_not_null().and(col(second).is_not_null()))
        .group_by_stable([col(first), col(second)])
        .agg([col(TOTAL_ALIAS).sum()])
        .sort([TOTAL_ALIAS], descending_stable())
        .limit(row_limit(n))
        .collect()?;

    let sums = totals.column(TOTAL_ALIAS)?.cast(&DataType::Float64)?;
    Ok(string_values(&totals, first)?
        .into_iter()
        .zip(string_values(&totals, second)?)
        .zip(sums.f64()?.into_iter())
        .map(|((first, second), total)| CombinationTotal {
            first: first.unwrap_or_default(),
            second: second.unwrap_or_default(),
            total_amount: total.unwrap_or(0.0),
        })
        .collect())
}

/// Summed amount per `column` value inside one amount cluster, smallest
/// first. [`ALL_CLUSTERS`] keeps every row.
pub fn treemap_totals(
    df: &DataFrame,
    mapping: &ColumnMapping,
    column: &str,
    cluster: &str,
) -> Result<Vec<CategoryTotal>> {
    let mut plan = df.clone().lazy();
    if cluster != ALL_CLUSTERS {
        plan = plan.filter(
            col(mapping.get(AMOUNT_USD_CLUSTER)?)
                .cast(DataType::String)
                .eq(lit(cluster)),
        );
    }
    aggregate_by(plan, column, amount_sum(mapping.get(AMOUNT_USD)?), ascending_stable(), None)
}

/// Headline figures for the rows of one treemap block.
pub fn block_insights(block: &DataFrame, mapping: &ColumnMapping) -> Result<BlockInsights> {
    let amount = mapping.get(AMOUNT_USD)?;
    Ok(BlockInsights {
        total_grants: block.height(),
        total_amount: column_sum(block, amount)?,
        average_amount: column_mean(block, amount)?.unwrap_or(0.0),
        median_amount: column_median(block, amount)?.unwrap_or(0.0),
        top_funders: aggregate_by(
            block.clone().lazy(),
            mapping.get(FUNDER_NAME)?,
            amount_sum(amount),
            descending_stable(),
            Some(BLOCK_TOP_N),
        )?,
        top_recipients: aggregate_by(
            block.clone().lazy(),
            mapping.get(RECIP_NAME)?,
            amount_sum(amount),
            descending_stable(),
            Some(BLOCK_TOP_N),
        )?,
        year_range: i64_range(block, mapping.get(YEAR_ISSUED)?)?,
        top_subjects: top_values(block, mapping.get(GRANT_SUBJECT_TRAN)?, BLOCK_TOP_N)?,
    })
}

/// Rows inside the window with a non-null amount.
pub fn filter_amount_window(
    df: &DataFrame,
    mapping: &ColumnMapping,
    window: &AmountWindow,
) -> Result<DataFrame> {
    let year = col(mapping.get(YEAR_ISSUED)?).cast(DataType::Int64);
    let amount = col(mapping.get(AMOUNT_USD)?).cast(DataType::Float64);
    Ok(df
        .clone()
        .lazy()
        .filter(
            year.clone()
                .gt_eq(lit(window.start_year))
                .and(year.lt_eq(lit(window.end_year)))
                .and(amount.clone().gt_eq(lit(window.min_amount)))
                .and(amount.clone().lt_eq(lit(window.max_amount)))
                .and(amount.is_not_null()),
        )
        .collect()?)
}

/// Mean amount per year, ascending.
pub fn yearly_mean_amount(df: &DataFrame, mapping: &ColumnMapping) -> Result<Vec<YearMean>> {
    let means = per_year(df, mapping.get(YEAR_ISSUED)?, amount_mean(mapping.get(AMOUNT_USD)?))?;
    Ok(means
        .into_iter()
        .map(|(year, mean_amount)| YearMean { year, mean_amount })
        .collect())
}

/// Grant count per (year, amount cluster), ascending by year then cluster.
pub fn cluster_density(df: &DataFrame, mapping: &ColumnMapping) -> Result<Vec<YearClusterCount>> {
    let year = mapping.get(YEAR_ISSUED)?;
    let cluster = mapping.get(AMOUNT_USD_CLUSTER)?;
    let counts = df
        .clone()
        .lazy()
        .select([
            col(year).cast(DataType::Int64),
            col(cluster).cast(DataType::String),
        ])
        .filter(col(year).is_not_null().and(col(cluster).is_not_null()))
        .group_by([col(year), col(cluster)])
        .agg([len().alias(COUNT_ALIAS)])
        .sort([year, cluster], SortMultipleOptions::default())
        .collect()?;

    Ok(i64_values(&counts, year)?
        .into_iter()
        .zip(string_values(&counts, cluster)?)
        .zip(count_values(&counts, COUNT_ALIAS)?)
        .map(|((year, cluster), grant_count)| YearClusterCount {
            year: year.unwrap_or_default(),
            cluster: cluster.unwrap_or_default(),
            grant_count,
        })
        .collect())
}

/// Summed amount per (year, `column` value), ascending by year then value.
pub fn categories_over_time(
    df: &DataFrame,
    mapping: &ColumnMapping,
    column: &str,
) -> Result<Vec<YearCategoryTotal>> {
    let year = mapping.get(YEAR_ISSUED)?;
    let totals = df
        .clone()
        .lazy()
        .select([
            col(year).cast(DataType::Int64),
            col(column).cast(DataType::String),
            col(mapping.get(AMOUNT_USD)?).cast(DataType::Float64).alias(TOTAL_ALIAS),
        ])
        .filter(col(year).is_not_null().and(col(column).is_not_null()))
        .group_by([col(year), col(column)])
        .agg([col(TOTAL_ALIAS).sum()])
        .sort([year, column], SortMultipleOptions::default())
        .collect()?;

    let sums = totals.column(TOTAL_ALIAS)?.cast(&DataType::Float64)?;
    Ok(i64_values(&totals, year)?
        .into_iter()
        .zip(string_values(&totals, column)?)
        .zip(sums.f64()?.into_iter())
        .map(|((year, category), total)| YearCategoryTotal {
            year: year.unwrap_or_default(),
            category: category.unwrap_or_default(),
            total_amount: total.unwrap_or(0.0),
        })
        .collect())
}

/// Mean amount of unique grants per `factor` value, highest first.
pub fn average_amount_by(
    df: &DataFrame,
    mapping: &ColumnMapping,
    factor: &str,
) -> Result<Vec<CategoryTotal>> {
    let grants = unique_grants(df, mapping)?;
    aggregate_by(
        grants.lazy(),
        factor,
        amount_mean(mapping.get(AMOUNT_USD)?),
        descending_stable(),
        None,
    )
}

/// Summed amount of one funder's unique grants per `factor` value, highest
/// first.
pub fn funder_affinity(
    df: &DataFrame,
    mapping: &ColumnMapping,
    funder: &str,
    factor: &str,
) -> Result<Vec<CategoryTotal>> {
    let grants = unique_grants(df, mapping)?
        .lazy()
        .filter(col(mapping.get(FUNDER_NAME)?).cast(DataType::String).eq(lit(funder)));
    aggregate_by(
        grants,
        factor,
        amount_sum(mapping.get(AMOUNT_USD)?),
        descending_stable(),
        None,
    )
}

/// `$1,234.56`
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let grouped = whole
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .join(",");

    format!("{}${}.{:02}", if negative { "-" } else { "" }, grouped, fraction)
}

/// Whole-number shorthand: 1234 -> "1K", 2_500_000 -> "2M".
pub fn format_large_number(num: f64) -> String {
    let num = num.trunc() as i64;
    if num >= 1_000_000_000 {
        format!("{}B", num / 1_000_000_000)
    } else if num >= 1_000_000 {
        format!("{}M", num / 1_000_000)
    } else if num >= 1_000 {
        format!("{}K", num / 1_000)
    } else {
        num.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::resolve;
    use crate::data_utils::f64_values;

    fn grants() -> DataFrame {
        df![
            "Grant Key" => ["G1", "G1", "G2", "G3", "G4"],
            "Amount Usd" => [100.0, 100.0, 50.0, 300.0, 75.0],
            "Funder Name" => ["Alpha", "Alpha", "Beta", "Gamma", "Beta"],
            "Recip Name" => ["R1", "R1", "R2", "R1", "R3"],
            "Funder Type" => ["Foundation", "Foundation", "Corporate", "Foundation", "Corporate"],
            "Grant Subject Tran" => ["Health", "Education", "Health", "Arts", "Health"],
            "Year Issued" => [2020i64, 2020, 2019, 2021, 2019],
            "Amount Usd Cluster" => ["0-50k", "0-50k", "0-50k", "0-50k", "0-50k"],
            "Grant Description" => [
                "Support for rural health clinics",
                "Support for rural health clinics",
                "Health outreach",
                "Arts for youth",
                "The clinics and the outreach",
            ],
        ]
        .unwrap()
    }

    fn mapping(df: &DataFrame) -> ColumnMapping {
        resolve(
            df,
            &[
                GRANT_KEY,
                AMOUNT_USD,
                AMOUNT_USD_CLUSTER,
                FUNDER_NAME,
                RECIP_NAME,
                FUNDER_TYPE,
                GRANT_SUBJECT_TRAN,
                YEAR_ISSUED,
                GRANT_DESCRIPTION,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_summary_counts_each_grant_once() {
        let df = grants();
        let metrics = summary_metrics(&df, &mapping(&df)).unwrap();
        assert_eq!(metrics.total_grants, 4);
        assert_eq!(metrics.total_amount, 525.0);
        assert_eq!(metrics.unique_funders, 3);
        assert_eq!(metrics.unique_recipients, 3);
    }

    #[test]
    fn test_top_funders() {
        let df = grants();
        let top = top_funders(&df, &mapping(&df), 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].category, "Gamma");
        assert_eq!(top[0].total_amount, 300.0);
        assert_eq!(top[1].category, "Beta");
        assert_eq!(top[1].total_amount, 125.0);
    }

    #[test]
    fn test_funder_type_shares() {
        let df = grants();
        let shares = funder_type_distribution(&df, &mapping(&df)).unwrap();
        assert_eq!(shares[0].funder_type, "Foundation");
        assert!((shares[0].percentage - 400.0 / 525.0 * 100.0).abs() < 1e-9);
        let total: f64 = shares.iter().map(|s| s.percentage).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_amount_by_year_sorted() {
        let df = grants();
        let m = mapping(&df);
        let unique = unique_grants(&df, &m).unwrap();
        let years = amount_by_year(&unique, &m).unwrap();
        assert_eq!(
            years,
            vec![
                YearTotal { year: 2019, total_amount: 125.0 },
                YearTotal { year: 2020, total_amount: 100.0 },
                YearTotal { year: 2021, total_amount: 300.0 },
            ]
        );
    }

    #[test]
    fn test_cluster_statistics_keep_bucket_order() {
        let df = grants();
        let stats = cluster_statistics(
            &df,
            &mapping(&df),
            &["1M+".to_string(), "0-50k".to_string()],
        )
        .unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].cluster, "0-50k");
        assert_eq!(stats[0].grant_count, 5);
        assert_eq!(stats[1].cluster, "1M+");
        assert_eq!(stats[1].grant_count, 0);
    }

    #[test]
    fn test_top_categories_count_unique_grants() {
        let df = grants();
        let counts = top_categories(&df, &mapping(&df), "Grant Subject Tran", 5).unwrap();
        assert_eq!(counts[0], CategoryCount { category: "Health".into(), unique_grants: 3 });
    }

    #[test]
    fn test_network_statistics() {
        let df = grants();
        let stats = network_statistics(&df, &mapping(&df)).unwrap();
        assert_eq!(stats.total_nodes, 6);
        assert_eq!(stats.total_connections, 4);
        assert_eq!(stats.most_connected_node.as_deref(), Some("R1"));
        assert_eq!(stats.most_connected_node_connections, 2);
        assert_eq!(stats.isolated_nodes, 0);
    }

    #[test]
    fn test_word_frequencies_skip_stopwords() {
        let df = grants();
        let words = description_word_frequencies(&df, &mapping(&df), 3).unwrap();
        assert_eq!(words[0], ("health".to_string(), 3));
        assert!(words.iter().all(|(word, _)| word != "the" && word != "for"));
    }

    #[test]
    fn test_network_self_edge_counts_node_but_not_connection() {
        let df = df![
            "Funder Name" => ["Alpha", "Beta"],
            "Recip Name" => ["Alpha", "R1"],
        ]
        .unwrap();
        let mapping = resolve(&df, &[FUNDER_NAME, RECIP_NAME]).unwrap();
        let stats = network_statistics(&df, &mapping).unwrap();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.most_connected_node.as_deref(), Some("Beta"));
        assert_eq!(stats.isolated_nodes, 1);
    }

    #[test]
    fn test_word_frequency_ties_keep_first_appearance() {
        let df = grants();
        let words = description_word_frequencies(&df, &mapping(&df), 2).unwrap();
        assert_eq!(
            words,
            vec![("health".to_string(), 3), ("clinics".to_string(), 3)]
        );
    }

    fn page_grants() -> DataFrame {
        df![
            "Grant Key" => ["P1", "P2", "P3", "P4", "P5", "P6"],
            "Amount Usd" => [10_000.0, 60_000.0, 20_000.0, 200_000.0, 30_000.0, 40_000.0],
            "Funder Name" => ["Alpha", "Alpha", "Beta", "Beta", "Gamma", "Alpha"],
            "Recip Name" => ["R1", "R2", "R1", "R3", "R4", "R1"],
            "Funder Type" => ["Foundation", "Foundation", "Corporate", "Corporate", "Foundation", "Foundation"],
            "Grant Subject Tran" => ["Health", "Health", "Arts", "Health", "Arts", "Youth"],
            "Grant Population Tran" => ["Children", "Adults", "Children", "Children", "Adults", "Children"],
            "Year Issued" => [2019i64, 2019, 2020, 2020, 2021, 2021],
            "Amount Usd Cluster" => ["0-50k", "50k-100k", "0-50k", "100k-500k", "0-50k", "0-50k"],
            "Grant Description" => ["a", "b", "c", "d", "e", "f"],
        ]
        .unwrap()
    }

    fn totals(entries: &[CategoryTotal]) -> Vec<(&str, f64)> {
        entries
            .iter()
            .map(|entry| (entry.category.as_str(), entry.total_amount))
            .collect()
    }

    #[test]
    fn test_heatmap_matrix_fills_missing_pairs_with_zero() {
        let df = page_grants();
        let matrix = heatmap_matrix(
            &df,
            &mapping(&df),
            "Grant Subject Tran",
            &["Health".to_string(), "Youth".to_string()],
            "Grant Population Tran",
            &["Children".to_string(), "Adults".to_string()],
        )
        .unwrap();

        assert_eq!(
            matrix.get_column_names(),
            vec!["Grant Subject Tran", "Adults", "Children"]
        );
        assert_eq!(
            string_values(&matrix, "Grant Subject Tran").unwrap(),
            vec![Some("Health".to_string()), Some("Youth".to_string())]
        );
        assert_eq!(f64_values(&matrix, "Adults").unwrap(), vec![60_000.0, 0.0]);
        assert_eq!(f64_values(&matrix, "Children").unwrap(), vec![210_000.0, 40_000.0]);
    }

    #[test]
    fn test_heatmap_matrix_with_no_matches_is_empty() {
        let df = page_grants();
        let matrix = heatmap_matrix(
            &df,
            &mapping(&df),
            "Grant Subject Tran",
            &["Environment".to_string()],
            "Grant Population Tran",
            &["Children".to_string()],
        )
        .unwrap();
        assert_eq!(matrix.height(), 0);
    }

    #[test]
    fn test_top_combinations() {
        let df = page_grants();
        let top = top_combinations(&df, &mapping(&df), "Grant Subject Tran", "Grant Population Tran", 3)
            .unwrap();
        assert_eq!(
            top,
            vec![
                CombinationTotal { first: "Health".into(), second: "Children".into(), total_amount: 210_000.0 },
                CombinationTotal { first: "Health".into(), second: "Adults".into(), total_amount: 60_000.0 },
                CombinationTotal { first: "Youth".into(), second: "Children".into(), total_amount: 40_000.0 },
            ]
        );
    }

    #[test]
    fn test_treemap_totals_ascending_within_cluster() {
        let df = page_grants();
        let m = mapping(&df);
        let small = treemap_totals(&df, &m, "Grant Subject Tran", "0-50k").unwrap();
        assert_eq!(
            totals(&small),
            vec![("Health", 10_000.0), ("Youth", 40_000.0), ("Arts", 50_000.0)]
        );

        let all = treemap_totals(&df, &m, "Grant Subject Tran", ALL_CLUSTERS).unwrap();
        assert_eq!(
            totals(&all),
            vec![("Youth", 40_000.0), ("Arts", 50_000.0), ("Health", 270_000.0)]
        );
    }

    #[test]
    fn test_block_insights() {
        let df = page_grants();
        let m = mapping(&df);
        let block = crate::data_utils::filter_eq(&df, "Grant Subject Tran", "Health").unwrap();
        let insights = block_insights(&block, &m).unwrap();

        assert_eq!(insights.total_grants, 3);
        assert_eq!(insights.total_amount, 270_000.0);
        assert_eq!(insights.average_amount, 90_000.0);
        assert_eq!(insights.median_amount, 60_000.0);
        assert_eq!(totals(&insights.top_funders), vec![("Beta", 200_000.0), ("Alpha", 70_000.0)]);
        assert_eq!(
            totals(&insights.top_recipients),
            vec![("R3", 200_000.0), ("R2", 60_000.0), ("R1", 10_000.0)]
        );
        assert_eq!(insights.year_range_label(), "2019 - 2020");
        assert_eq!(insights.top_subjects, vec![("Health".to_string(), 3)]);
    }

    #[test]
    fn test_amount_window_filter() {
        let df = page_grants();
        let m = mapping(&df);
        let window = AmountWindow {
            start_year: 2020,
            end_year: 2021,
            min_amount: 15_000.0,
            max_amount: 100_000.0,
        };
        let filtered = filter_amount_window(&df, &m, &window).unwrap();
        assert_eq!(
            string_values(&filtered, "Grant Key").unwrap(),
            vec![Some("P3".to_string()), Some("P5".to_string()), Some("P6".to_string())]
        );

        let full = AmountWindow::covering(&df, &m).unwrap();
        assert_eq!((full.start_year, full.end_year), (2019, 2021));
        assert_eq!(filter_amount_window(&df, &m, &full).unwrap().height(), 6);
    }

    #[test]
    fn test_yearly_mean_and_density() {
        let df = page_grants();
        let m = mapping(&df);
        assert_eq!(
            yearly_mean_amount(&df, &m).unwrap(),
            vec![
                YearMean { year: 2019, mean_amount: 35_000.0 },
                YearMean { year: 2020, mean_amount: 110_000.0 },
                YearMean { year: 2021, mean_amount: 35_000.0 },
            ]
        );

        let density = cluster_density(&df, &m).unwrap();
        let rows: Vec<(i64, &str, usize)> = density
            .iter()
            .map(|d| (d.year, d.cluster.as_str(), d.grant_count))
            .collect();
        assert_eq!(
            rows,
            vec![
                (2019, "0-50k", 1),
                (2019, "50k-100k", 1),
                (2020, "0-50k", 1),
                (2020, "100k-500k", 1),
                (2021, "0-50k", 2),
            ]
        );
    }

    #[test]
    fn test_categories_over_time() {
        let df = page_grants();
        let rows: Vec<(i64, String, f64)> = categories_over_time(&df, &mapping(&df), "Grant Subject Tran")
            .unwrap()
            .into_iter()
            .map(|r| (r.year, r.category, r.total_amount))
            .collect();
        assert_eq!(
            rows,
            vec![
                (2019, "Health".to_string(), 70_000.0),
                (2020, "Arts".to_string(), 20_000.0),
                (2020, "Health".to_string(), 200_000.0),
                (2021, "Arts".to_string(), 30_000.0),
                (2021, "Youth".to_string(), 40_000.0),
            ]
        );
    }

    #[test]
    fn test_average_amount_by_factor() {
        let df = page_grants();
        let averages = average_amount_by(&df, &mapping(&df), "Funder Name").unwrap();
        assert_eq!(averages[0].category, "Beta");
        assert_eq!(averages[0].total_amount, 110_000.0);
        assert_eq!(averages[1].category, "Alpha");
        assert!((averages[1].total_amount - 110_000.0 / 3.0).abs() < 1e-6);
        assert_eq!(averages[2].category, "Gamma");
    }

    #[test]
    fn test_funder_affinity() {
        let df = page_grants();
        let affinity = funder_affinity(&df, &mapping(&df), "Alpha", "Grant Subject Tran").unwrap();
        assert_eq!(totals(&affinity), vec![("Health", 70_000.0), ("Youth", 40_000.0)]);
        assert!(funder_affinity(&df, &mapping(&df), "Nobody", "Grant Subject Tran")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_currency(-42.129), "-$42.13");
    }

    #[test]
    fn test_format_large_number() {
        assert_eq!(format_large_number(999.9), "999");
        assert_eq!(format_large_number(1_500.0), "1K");
        assert_eq!(format_large_number(2_500_000.0), "2M");
        assert_eq!(format_large_number(3_000_000_000.0), "3B");
    }
}
