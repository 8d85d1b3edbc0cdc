//! Shared helpers for parsing raw CSV text and moving data between polars
//! frames and plain Rust values.

use crate::error::{DashboardError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters used in numeric formatting that are stripped before parsing.
pub const NUMERIC_FORMAT_CHARS: [char; 8] = [',', '$', '%', '€', '£', '₹', ' ', '\u{a0}'];

/// Cell values that mean "no value".
pub const ERROR_MARKERS: [&str; 10] = [
    "error", "unknown", "n/a", "na", "nan", "null", "missing", "none", "#n/a", "-",
];

/// Clean a string for numeric parsing by removing formatting characters.
///
/// ```rust,ignore
/// assert_eq!(clean_numeric_string("₹1,234.50"), "1234.50");
/// ```
pub fn clean_numeric_string(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !NUMERIC_FORMAT_CHARS.contains(c))
        .collect()
}

/// Check if a string is an error/missing value marker.
pub fn is_error_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    ERROR_MARKERS.iter().any(|&marker| lower == marker)
}

/// Parse a formatted numeric string. Blank cells, error markers, anything
/// unparsable and non-finite results all give `None`.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() || is_error_marker(trimmed) {
        return None;
    }
    clean_numeric_string(trimmed)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

// =============================================================================
// Date Utilities
// =============================================================================

/// Days between 0001-01-01 and 1970-01-01, the offset between chrono's
/// day count and polars' `Date` representation.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// English month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Layout of a date column in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    /// `DD-MM-YYYY`, used by the international sales export.
    DayMonthYear,
    /// `YYYY-MM-DD`, used by the national sales export.
    YearMonthDay,
}

impl DateFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::DayMonthYear => "%d-%m-%Y",
            DateFormat::YearMonthDay => "%Y-%m-%d",
        }
    }
}

/// Parse a date cell. A trailing time part (`2022-04-30 00:00:00`,
/// `2022-04-30T10:00`) is ignored. Anything else that does not match the
/// expected layout gives `None`.
pub fn parse_date(s: &str, format: DateFormat) -> Option<NaiveDate> {
    let token = s.trim().split([' ', 'T']).next()?;
    if token.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(token, format.pattern()).ok()
}

/// Convert a date to polars' days-since-epoch representation.
pub fn date_to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Convert polars' days-since-epoch back to a date.
pub fn epoch_days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

/// Name of a 1-based month number.
pub fn month_name(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_NAMES[month as usize - 1],
        _ => "Unknown",
    }
}

/// `YYYY-MM` key used for monthly buckets.
pub fn year_month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

// =============================================================================
// Frame Access Utilities
// =============================================================================

/// Check that a table has every listed column, reporting all missing ones
/// at once.
pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> Result<()> {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| df.column(c).is_err())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DashboardError::missing_columns(table, &missing))
    }
}

/// Check if a frame has a column with at least one non-null value.
pub fn has_values(df: &DataFrame, name: &str) -> bool {
    df.column(name)
        .map(|c| c.len() > c.null_count())
        .unwrap_or(false)
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| DashboardError::ColumnNotFound(name.to_string()))
}

/// Values of a numeric column as `f64`, nulls kept as `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let cast = series(df, name)?.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Values of any column rendered as strings, nulls kept as `None`.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let cast = series(df, name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Values of a `Date` column.
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let cast = series(df, name)?.cast(&DataType::Int32)?;
    Ok(cast
        .i32()?
        .into_iter()
        .map(|v| v.and_then(epoch_days_to_date))
        .collect())
}

/// Keep the rows whose mask entry is true.
pub fn filter_rows(df: &DataFrame, mask: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), mask);
    Ok(df.filter(&mask)?)
}

/// Build a frame from equally long series.
pub fn frame_from_series(columns: Vec<Series>) -> Result<DataFrame> {
    Ok(DataFrame::new(
        columns.into_iter().map(|s| s.into_column()).collect(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==== numeric parsing tests ====

    #[test]
    fn test_clean_numeric_string() {
        assert_eq!(clean_numeric_string("$1,234.56"), "1234.56");
        assert_eq!(clean_numeric_string("  42%  "), "42");
        assert_eq!(clean_numeric_string("₹ 599"), "599");
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("1,200"), Some(1200.0));
        assert_eq!(parse_numeric_string(" 7.5 "), Some(7.5));
        assert_eq!(parse_numeric_string("N/A"), None);
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("abc"), None);
        assert_eq!(parse_numeric_string("inf"), None);
    }

    #[test]
    fn test_is_error_marker() {
        assert!(is_error_marker("NULL"));
        assert!(is_error_marker(" #N/A "));
        assert!(!is_error_marker("42"));
    }

    // ==== date tests ====

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 6, 5);
        assert_eq!(parse_date("05-06-2021", DateFormat::DayMonthYear), expected);
        assert_eq!(parse_date("2021-06-05", DateFormat::YearMonthDay), expected);
        assert_eq!(
            parse_date("2021-06-05 00:00:00", DateFormat::YearMonthDay),
            expected
        );
        assert_eq!(parse_date("2021-06-05", DateFormat::DayMonthYear), None);
        assert_eq!(parse_date("31-02-2021", DateFormat::DayMonthYear), None);
        assert_eq!(parse_date("", DateFormat::YearMonthDay), None);
    }

    #[test]
    fn test_epoch_days_round_trip_anchor() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_epoch_days(epoch), 0);
        assert_eq!(epoch_days_to_date(1), NaiveDate::from_ymd_opt(1970, 1, 2));
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(month_name(1), "January");
        assert_eq!(month_name(12), "December");
        assert_eq!(month_name(13), "Unknown");
        let date = NaiveDate::from_ymd_opt(2022, 3, 9).unwrap();
        assert_eq!(year_month_key(date), "2022-03");
    }

    // ==== frame access tests ====

    #[test]
    fn test_require_columns_lists_all_missing() {
        let df = df!("sku" => ["A"], "stock" => [1.0]).unwrap();
        assert!(require_columns(&df, "Stock", &["sku", "stock"]).is_ok());

        let err = require_columns(&df, "Stock", &["sku", "size", "colour"]).unwrap_err();
        match err {
            DashboardError::MissingColumns { table, columns } => {
                assert_eq!(table, "Stock");
                assert_eq!(columns, vec!["size".to_string(), "colour".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_value_extraction_and_filter() {
        let df = df!(
            "sku" => [Some("A"), None, Some("C")],
            "qty" => [Some(1.0), Some(2.0), None]
        )
        .unwrap();

        assert_eq!(
            str_values(&df, "sku").unwrap(),
            vec![Some("A".to_string()), None, Some("C".to_string())]
        );
        assert_eq!(f64_values(&df, "qty").unwrap(), vec![Some(1.0), Some(2.0), None]);
        assert!(matches!(
            f64_values(&df, "missing"),
            Err(DashboardError::ColumnNotFound(_))
        ));

        let filtered = filter_rows(&df, &[true, false, true]).unwrap();
        assert_eq!(filtered.height(), 2);
        assert!(has_values(&df, "qty"));
    }
}
