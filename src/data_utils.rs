use crate::error::Result;
use polars::prelude::*;

const COUNT_ALIAS: &str = "__count";

/// String view of a column; non-string columns are cast first.
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(column)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

/// Non-null numeric values of a column as f64.
pub fn f64_values(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().flatten().collect();
    Ok(values)
}

/// Row counts or other integer results as `usize`; nulls read as 0.
pub(crate) fn count_values(df: &DataFrame, column: &str) -> Result<Vec<usize>> {
    let series = df.column(column)?.cast(&DataType::UInt64)?;
    let values = series
        .u64()?
        .into_iter()
        .map(|count| count.unwrap_or(0) as usize)
        .collect();
    Ok(values)
}

pub(crate) fn i64_values(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let series = df.column(column)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

pub fn i64_range(df: &DataFrame, column: &str) -> Result<Option<(i64, i64)>> {
    let series = df.column(column)?.cast(&DataType::Int64)?;
    let values = series.i64()?;
    Ok(values.min().zip(values.max()))
}

pub fn f64_range(df: &DataFrame, column: &str) -> Result<Option<(f64, f64)>> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    let values = series.f64()?;
    Ok(values.min().zip(values.max()))
}

/// Distinct non-null values of a column.
pub fn n_unique(df: &DataFrame, column: &str) -> Result<usize> {
    Ok(df.column(column)?.drop_nulls().n_unique()?)
}

/// Distinct values in order of first appearance.
pub fn unique_in_order(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let distinct = df
        .column(column)?
        .cast(&DataType::String)?
        .drop_nulls()
        .unique_stable()?;
    Ok(distinct.str()?.into_iter().flatten().map(str::to_string).collect())
}

/// Most frequent values, highest count first. Ties keep first-appearance order.
pub fn top_values(df: &DataFrame, column: &str, n: usize) -> Result<Vec<(String, usize)>> {
    let counts = df
        .clone()
        .lazy()
        .select([col(column).cast(DataType::String)])
        .filter(col(column).is_not_null())
        .group_by_stable([col(column)])
        .agg([len().alias(COUNT_ALIAS)])
        .sort([COUNT_ALIAS], descending_stable())
        .limit(row_limit(n))
        .collect()?;

    Ok(string_values(&counts, column)?
        .into_iter()
        .zip(count_values(&counts, COUNT_ALIAS)?)
        .map(|(value, count)| (value.unwrap_or_default(), count))
        .collect())
}

pub fn column_sum(df: &DataFrame, column: &str) -> Result<f64> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.sum().unwrap_or(0.0))
}

/// `None` when the column has no non-null values.
pub fn column_mean(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    Ok(df.column(column)?.cast(&DataType::Float64)?.mean())
}

/// `None` when the column has no non-null values.
pub fn column_median(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    Ok(df.column(column)?.cast(&DataType::Float64)?.median())
}

pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Rows whose `column` equals `value`.
pub fn filter_eq(df: &DataFrame, column: &str, value: &str) -> Result<DataFrame> {
    let filtered = df
        .clone()
        .lazy()
        .filter(col(column).cast(DataType::String).eq(lit(value)))
        .collect()?;
    Ok(filtered)
}

/// Rows whose `column` is one of `values`.
pub fn filter_in(df: &DataFrame, column: &str, values: &[String]) -> Result<DataFrame> {
    let filtered = df
        .clone()
        .lazy()
        .filter(in_values(column, values))
        .collect()?;
    Ok(filtered)
}

/// `column` (as text) is one of `values`.
pub(crate) fn in_values(column: &str, values: &[String]) -> Expr {
    col(column)
        .cast(DataType::String)
        .is_in(lit(Series::new("values", values)))
}

/// Descending sort that keeps the incoming order between equal keys.
pub(crate) fn descending_stable() -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending(true)
        .with_maintain_order(true)
}

pub(crate) fn ascending_stable() -> SortMultipleOptions {
    SortMultipleOptions::default().with_maintain_order(true)
}

pub(crate) fn row_limit(n: usize) -> IdxSize {
    n.min(IdxSize::MAX as usize) as IdxSize
}
