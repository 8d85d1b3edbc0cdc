//! Dashboard sections.
//!
//! Each section is a function from a [`SectionContext`] to a serializable
//! report. Sections never see global state: the source tables, thresholds
//! and filters all arrive through the context. [`run_section`] is the
//! isolation boundary that turns a failing section into a skipped one.

pub mod correlation;
pub mod customers;
pub mod geography;
pub mod inventory;
pub mod margins;
pub mod performance;
pub mod products;
pub mod returns;
pub mod sales;

use crate::classify::Classifiers;
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::filters::DashboardFilters;
use crate::join::dedup_first;
use crate::loader::SourceTables;
use crate::utils::{filter_rows, str_values};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Everything a section may read.
#[derive(Debug, Clone, Copy)]
pub struct SectionContext<'a> {
    pub sources: &'a SourceTables,
    pub config: &'a DashboardConfig,
    pub filters: &'a DashboardFilters,
    pub classifiers: &'a Classifiers,
}

impl SectionContext<'_> {
    /// The stock report with one row per SKU (first occurrence wins).
    pub fn catalog(&self) -> Result<DataFrame> {
        dedup_first(self.sources.stock()?, "sku")
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.config.reference_date_or_today()
    }

    pub fn top_n(&self) -> usize {
        self.config.top_n
    }
}

/// The dashboard sections, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Sales,
    Products,
    Inventory,
    Returns,
    Correlation,
    Customers,
    Margins,
    Geography,
    Performance,
}

impl Section {
    pub const ALL: [Section; 9] = [
        Section::Sales,
        Section::Products,
        Section::Inventory,
        Section::Returns,
        Section::Correlation,
        Section::Customers,
        Section::Margins,
        Section::Geography,
        Section::Performance,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Section::Sales => "Sales Overview",
            Section::Products => "Product Analysis",
            Section::Inventory => "Inventory Management",
            Section::Returns => "Product Returns",
            Section::Correlation => "Stock & Return Correlation",
            Section::Customers => "Customer Insights",
            Section::Margins => "Profit Margins",
            Section::Geography => "Geographic Sales",
            Section::Performance => "Product Performance",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A section's report, or why it was skipped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Ready { data: T },
    Skipped { code: String, message: String },
}

impl<T> SectionOutcome<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            SectionOutcome::Ready { data } => Some(data),
            SectionOutcome::Skipped { .. } => None,
        }
    }

    pub fn skip_message(&self) -> Option<&str> {
        match self {
            SectionOutcome::Ready { .. } => None,
            SectionOutcome::Skipped { message, .. } => Some(message),
        }
    }
}

/// Run one section, converting its error into a skipped outcome.
pub fn run_section<T>(section: Section, build: impl FnOnce() -> Result<T>) -> SectionOutcome<T> {
    info!("Building section: {}", section);
    match build() {
        Ok(data) => SectionOutcome::Ready { data },
        Err(e) => {
            if e.is_data_issue() {
                warn!("Skipping {}: {}", section, e);
            } else {
                tracing::error!("{} failed: {}", section, e);
            }
            SectionOutcome::Skipped {
                code: e.error_code().to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Keep rows where `column` equals `value`; `None` keeps everything.
pub(crate) fn filter_equals(
    df: &DataFrame,
    column: &str,
    value: Option<&str>,
) -> Result<DataFrame> {
    let Some(value) = value else {
        return Ok(df.clone());
    };
    let mask: Vec<bool> = str_values(df, column)?
        .iter()
        .map(|v| v.as_deref() == Some(value))
        .collect();
    filter_rows(df, &mask)
}

/// Values of an optional column; all `None` when the column is absent.
pub(crate) fn optional_str_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    if df.column(column).is_ok() {
        str_values(df, column)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Sorted distinct non-null values of a column.
pub(crate) fn distinct_sorted(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let mut values: Vec<String> = str_values(df, column)?.into_iter().flatten().collect();
    values.sort();
    values.dedup();
    Ok(values)
}

/// Fail with [`DashboardError::EmptySelection`] when a filter removed every row.
pub(crate) fn ensure_rows(df: &DataFrame, what: impl Into<String>) -> Result<()> {
    if df.height() == 0 {
        Err(DashboardError::EmptySelection(what.into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_section_converts_errors() {
        let outcome: SectionOutcome<u32> = run_section(Section::Returns, || {
            Err(DashboardError::missing_columns("National Sales", &["Order_ID"]))
        });

        assert!(outcome.ready().is_none());
        assert_eq!(
            outcome.skip_message(),
            Some("Missing columns in National Sales: Order_ID")
        );

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["code"], "MISSING_COLUMNS");
    }

    #[test]
    fn test_run_section_passes_data_through() {
        let outcome = run_section(Section::Sales, || Ok(7));
        assert_eq!(outcome.ready(), Some(&7));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["data"], 7);
    }

    #[test]
    fn test_filter_helpers() {
        let df = df!("size" => [Some("M"), Some("L"), None, Some("M")]).unwrap();
        assert_eq!(filter_equals(&df, "size", Some("M")).unwrap().height(), 2);
        assert_eq!(filter_equals(&df, "size", None).unwrap().height(), 4);
        assert_eq!(distinct_sorted(&df, "size").unwrap(), vec!["L", "M"]);
        assert!(ensure_rows(&df.head(Some(0)), "size").is_err());
        assert_eq!(optional_str_values(&df, "design_no").unwrap(), vec![None; 4]);
    }
}
