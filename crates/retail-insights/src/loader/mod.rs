//! CSV loading for the retail exports.
//!
//! Every file is read with all columns as text. Column names are trimmed,
//! then each [`TableSchema`] says which columns to coerce to numbers and
//! which column holds the date. Bad cells become nulls; the rows stay.

pub mod coercion;
pub mod sources;

pub use coercion::{MONTH_COLUMN, YEAR_COLUMN, add_date_parts, coerce_numeric, parse_dates};
pub use sources::{LoadFailure, SourceTables, TableStatus};

use crate::error::{DashboardError, Result, ResultExt};
use crate::utils::DateFormat;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// How a source table is typed after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Human-readable table name used in messages.
    pub name: &'static str,
    /// Columns coerced to `Float64` when present.
    pub numeric: &'static [&'static str],
    /// Date column and its layout, if the table has one.
    pub date: Option<(&'static str, DateFormat)>,
}

/// Stock report: one row per SKU with its current stock.
pub const STOCK_SCHEMA: TableSchema = TableSchema {
    name: "Stock Report",
    numeric: &["stock"],
    date: None,
};

/// International (wholesale) sales, dated `DD-MM-YYYY`.
pub const INTERNATIONAL_SALES_SCHEMA: TableSchema = TableSchema {
    name: "International Sales",
    numeric: &["Quantity_Purchased", "rate", "Gross_Amount"],
    date: Some(("date", DateFormat::DayMonthYear)),
};

/// National marketplace orders, dated `YYYY-MM-DD`.
pub const NATIONAL_SALES_SCHEMA: TableSchema = TableSchema {
    name: "National Sales",
    numeric: &["quantity", "sale", "avg. value"],
    date: Some(("date", DateFormat::YearMonthDay)),
};

/// Yearly product cost/price sheet.
pub const PRODUCT_SHEET_SCHEMA: TableSchema = TableSchema {
    name: "Product Info",
    numeric: &["cost_price", "mrp"],
    date: None,
};

/// Read a CSV with every column as text and trimmed column names.
///
/// Falls back to a cleaned copy of the content when the file has stray
/// doubled quotes or blank lines that the reader rejects.
pub fn read_csv_strings(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(DashboardError::FileNotFound(path.to_path_buf()));
    }

    let mut df = match CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => df,
        Err(e) => {
            debug!("Standard CSV read of {} failed: {}", path.display(), e);
            let content = std::fs::read_to_string(path)?;
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .into_reader_with_file_handle(Cursor::new(clean_csv_content(&content)))
                .finish()
                .context(format!("Failed to parse {}", path.display()))?
        }
    };

    trim_column_names(&mut df)?;
    Ok(df)
}

/// Remove doubled quotes and blank lines.
fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn trim_column_names(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    df.set_column_names(names)?;
    Ok(())
}

/// Apply a schema to a frame: coerce numeric columns, parse the date column
/// and add its year/month parts. Columns the schema names but the frame
/// lacks are left for the sections to report.
pub fn apply_schema(mut df: DataFrame, schema: &TableSchema) -> Result<DataFrame> {
    trim_column_names(&mut df)?;

    for &name in schema.numeric {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let coerced = coerce_numeric(column.as_materialized_series())?;
        if coerced.unparsable > 0 {
            debug!(
                "{}: {} values in '{}' could not be parsed as numbers",
                schema.name, coerced.unparsable, name
            );
        }
        df.with_column(coerced.series)?;
    }

    if let Some((name, format)) = schema.date
        && let Ok(column) = df.column(name)
    {
        let parsed = parse_dates(column.as_materialized_series(), format)?;
        if parsed.unparsable > 0 {
            warn!(
                "{}: {} dates in '{}' do not match {}",
                schema.name,
                parsed.unparsable,
                name,
                format.pattern()
            );
        }
        df.with_column(parsed.series)?;
        add_date_parts(&mut df, name)?;
    }

    Ok(df)
}

/// Load one CSV and type it by its schema.
pub fn load_table(path: &Path, schema: &TableSchema) -> Result<DataFrame> {
    let raw = read_csv_strings(path)?;
    let df = apply_schema(raw, schema)?;
    info!(
        "Loaded {} from {}: {} rows x {} columns",
        schema.name,
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}
