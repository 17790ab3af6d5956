//! CSV export of single tables and of multi-sheet workbooks.
//!
//! A workbook is written as a directory: one CSV per sheet plus a
//! `summary.csv` manifest listing sheet names, files and row counts.

use crate::columns::{ColumnMapping, AMOUNT_USD};
use crate::data_utils::filter_eq;
use crate::error::{GrantScopeError, Result};
use crate::summary::top_categories;
use chrono::Utc;
use polars::prelude::*;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MAX_SHEET_NAME_LEN: usize = 31;
pub const MANIFEST_FILE: &str = "summary.csv";

pub fn write_csv<W: Write>(table: &DataFrame, writer: W) -> Result<()> {
    let mut table = table.clone();
    let mut writer = writer;
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(&mut table)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub table: DataFrame,
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet and returns the name it was stored under.
    pub fn add_sheet(&mut self, name: &str, table: DataFrame) -> String {
        let taken: HashSet<&str> = self.sheets.iter().map(|s| s.name.as_str()).collect();
        let name = unique_sheet_name(name, &taken);
        self.sheets.push(Sheet { name: name.clone(), table });
        name
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

fn truncate_chars(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

pub(crate) fn unique_sheet_name(name: &str, taken: &HashSet<&str>) -> String {
    let base = if name.trim().is_empty() { "Sheet" } else { name.trim() };
    let candidate = truncate_chars(base, MAX_SHEET_NAME_LEN);
    if !taken.contains(candidate.as_str()) {
        return candidate;
    }

    let mut n = 2;
    loop {
        let suffix = format!(" ({})", n);
        let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
        let candidate = format!("{}{}", truncate_chars(base, room), suffix);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

fn file_stem(index: usize, name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{:02}_{}", index + 1, slug.trim_matches('_'))
}

/// Writes every sheet plus the manifest into `dir`, creating it if needed.
pub fn write_workbook(dir: &Path, workbook: &Workbook) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(workbook.len() + 1);
    let mut manifest = ::csv::Writer::from_path(dir.join(MANIFEST_FILE))
        .map_err(|e| GrantScopeError::Export(format!("Failed to create manifest: {}", e)))?;
    manifest
        .write_record(["Sheet", "File", "Rows", "Generated At"])
        .map_err(|e| GrantScopeError::Export(e.to_string()))?;

    let generated_at = Utc::now().to_rfc3339();
    for (index, sheet) in workbook.sheets().iter().enumerate() {
        let path = dir.join(format!("{}.csv", file_stem(index, &sheet.name)));
        let file = std::fs::File::create(&path)?;
        write_csv(&sheet.table, file)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rows = sheet.table.height().to_string();
        manifest
            .write_record([
                sheet.name.as_str(),
                file_name.as_str(),
                rows.as_str(),
                generated_at.as_str(),
            ])
            .map_err(|e| GrantScopeError::Export(e.to_string()))?;
        written.push(path);
    }

    manifest.flush()?;
    written.push(dir.join(MANIFEST_FILE));
    info!("Wrote workbook with {} sheets to {}", workbook.len(), dir.display());
    Ok(written)
}

/// Summary sheet of the top `n` values of `column` by unique grants, then one
/// sheet per value holding its rows, largest amount first.
pub fn top_category_workbook(
    df: &DataFrame,
    mapping: &ColumnMapping,
    column: &str,
    n: usize,
) -> Result<Workbook> {
    let counts = top_categories(df, mapping, column, n)?;

    let summary = DataFrame::new(vec![
        Series::new(column, counts.iter().map(|c| c.category.clone()).collect::<Vec<_>>()),
        Series::new(
            "Unique Grant Keys",
            counts.iter().map(|c| c.unique_grants as u64).collect::<Vec<_>>(),
        ),
    ])?;

    let mut workbook = Workbook::new();
    workbook.add_sheet("Summary", summary);

    let amount_column = mapping.get(AMOUNT_USD)?;
    for count in &counts {
        let rows = filter_eq(df, column, &count.category)?;
        workbook.add_sheet(&count.category, sort_by_amount_desc(&rows, amount_column)?);
    }
    Ok(workbook)
}

/// Largest amount first; rows with equal amounts keep their order and rows
/// without an amount go last.
fn sort_by_amount_desc(df: &DataFrame, amount_column: &str) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .sort(
            [amount_column],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?)
}
