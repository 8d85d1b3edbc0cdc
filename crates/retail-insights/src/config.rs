//! Configuration for dashboard runs.
//!
//! [`DashboardConfig`] says where the source CSVs live and which thresholds
//! the classifiers use. It is built with [`DashboardConfig::builder()`] or
//! deserialized from JSON; both paths go through [`DashboardConfig::validate`].

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use crate::error::DashboardError;
use std::path::{Path, PathBuf};

/// A yearly product cost/price sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSheet {
    /// Label shown to users, e.g. "May 2022".
    pub label: String,
    /// File name relative to the data directory.
    pub file: String,
}

impl ProductSheet {
    pub fn new(label: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            file: file.into(),
        }
    }
}

/// Source file names, relative to [`DashboardConfig::data_dir`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub stock: String,
    pub international_sales: String,
    pub national_sales: String,
    /// Product sheets, oldest first. Year-over-year comparison uses the
    /// first and last entries.
    pub product_sheets: Vec<ProductSheet>,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            stock: "new_stock_report.csv".to_string(),
            international_sales: "new_international_sales_report.csv".to_string(),
            national_sales: "new_amazon_national_sales.csv".to_string(),
            product_sheets: vec![
                ProductSheet::new("March 2021", "new_2021_product_info.csv"),
                ProductSheet::new("May 2022", "new_2022_product_info.csv"),
            ],
        }
    }
}

/// Thresholds used by the classifiers and the correlation views.
///
/// Stock and return-rate boundaries are inclusive on the "at most" side:
/// a stock of exactly `stock_low_max` is Low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Stock at or below this is Low. Default: 10
    pub stock_low_max: f64,
    /// Stock at or below this (and above low) is Medium. Default: 50
    pub stock_medium_max: f64,
    /// Overstock requires stock strictly above this. Default: 50
    pub overstock_min_stock: f64,
    /// Overstock requires stock/(sales+1) strictly above this. Default: 5
    pub overstock_min_ratio: f64,
    /// Ratio above which an overstocked item should be promoted. Default: 10
    pub promote_ratio: f64,
    /// Days without a sale before recommending a discount. Default: 90
    pub stale_discount_days: i64,
    /// Days without a sale before considering discontinuation. Default: 180
    pub stale_discontinue_days: i64,
    /// Units sold below which a stale item may be discontinued. Default: 5
    pub discontinue_max_sales: f64,
    /// Sales needed for High reorder priority. Default: 10
    pub high_priority_min_sales: usize,
    /// Sales needed for Medium reorder priority. Default: 5
    pub medium_priority_min_sales: usize,
    /// A sale within this many days counts as recent. Default: 30
    pub recent_sale_days: i64,
    /// Days of cover targeted by reorder quantities. Default: 30
    pub reorder_horizon_days: f64,
    /// Return rate (%) at or above which a product is high-return. Default: 90
    pub high_return_rate: f64,
    /// Return rate (%) above which a well-stocked item is high-risk. Default: 70
    pub high_risk_return_rate: f64,
    /// Return rate (%) counted as elevated in correlation views. Default: 50
    pub elevated_return_rate: f64,
    /// Only rows with stock below this enter the stock/return scatter. Default: 500
    pub stock_scatter_cap: f64,
    /// Only rows with per-day cost below this enter the cost/return scatter. Default: 100
    pub cost_scatter_cap: f64,
    /// Holding cost per unit of stock per day. Default: 0.15
    pub holding_cost_per_unit: f64,
    /// Holding cost as a share of the average sale price. Default: 0.001
    pub holding_cost_price_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stock_low_max: 10.0,
            stock_medium_max: 50.0,
            overstock_min_stock: 50.0,
            overstock_min_ratio: 5.0,
            promote_ratio: 10.0,
            stale_discount_days: 90,
            stale_discontinue_days: 180,
            discontinue_max_sales: 5.0,
            high_priority_min_sales: 10,
            medium_priority_min_sales: 5,
            recent_sale_days: 30,
            reorder_horizon_days: 30.0,
            high_return_rate: 90.0,
            high_risk_return_rate: 70.0,
            elevated_return_rate: 50.0,
            stock_scatter_cap: 500.0,
            cost_scatter_cap: 100.0,
            holding_cost_per_unit: 0.15,
            holding_cost_price_rate: 0.001,
        }
    }
}

/// Configuration for a dashboard run.
///
/// # Example
///
/// ```rust,ignore
/// use retail_insights::DashboardConfig;
///
/// let config = DashboardConfig::builder()
///     .data_dir("./data")
///     .top_n(15)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Directory holding the source CSV files.
    /// Default: "data"
    pub data_dir: PathBuf,

    /// Source file names.
    pub files: SourceFiles,

    /// Classifier and correlation thresholds.
    pub thresholds: Thresholds,

    /// Suffix for right-hand columns that collide during joins.
    /// Default: "_report"
    pub join_suffix: String,

    /// Length of "top N" rankings.
    /// Default: 10
    pub top_n: usize,

    /// Date that "days since last sale" is measured from.
    /// If None, today's local date is used.
    /// Default: None
    pub reference_date: Option<NaiveDate>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            files: SourceFiles::default(),
            thresholds: Thresholds::default(),
            join_suffix: "_report".to_string(),
            top_n: 10,
            reference_date: None,
        }
    }
}

impl DashboardConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DashboardConfigBuilder {
        DashboardConfigBuilder::default()
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Err(DashboardError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: DashboardConfig = serde_json::from_str(&content).map_err(|e| {
            DashboardError::Json(e).with_context(format!("Failed to parse {}", path.display()))
        })?;
        config
            .validate()
            .map_err(|e| DashboardError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Full path of a file inside the data directory.
    pub fn path_for(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// The configured reference date, or today.
    pub fn reference_date_or_today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let t = &self.thresholds;

        if t.stock_low_max >= t.stock_medium_max {
            return Err(ConfigValidationError::StockBands {
                low: t.stock_low_max,
                medium: t.stock_medium_max,
            });
        }

        for (field, value) in [
            ("high_return_rate", t.high_return_rate),
            ("high_risk_return_rate", t.high_risk_return_rate),
            ("elevated_return_rate", t.elevated_return_rate),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigValidationError::InvalidPercentage {
                    field: field.to_string(),
                    value,
                });
            }
        }

        for (field, value) in [
            ("holding_cost_per_unit", t.holding_cost_per_unit),
            ("holding_cost_price_rate", t.holding_cost_price_rate),
            ("stock_scatter_cap", t.stock_scatter_cap),
            ("cost_scatter_cap", t.cost_scatter_cap),
            ("reorder_horizon_days", t.reorder_horizon_days),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigValidationError::NegativeValue {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if self.top_n == 0 {
            return Err(ConfigValidationError::InvalidTopN(self.top_n));
        }

        if self.join_suffix.is_empty() {
            return Err(ConfigValidationError::EmptyJoinSuffix);
        }

        let sheets = &self.files.product_sheets;
        for (i, sheet) in sheets.iter().enumerate() {
            if sheets[..i].iter().any(|s| s.label == sheet.label) {
                return Err(ConfigValidationError::DuplicateSheetLabel(
                    sheet.label.clone(),
                ));
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Stock bands overlap: low max {low} must be below medium max {medium}")]
    StockBands { low: f64, medium: f64 },

    #[error("Invalid percentage for '{field}': {value} (must be between 0 and 100)")]
    InvalidPercentage { field: String, value: f64 },

    #[error("Invalid value for '{field}': {value} (must be a non-negative number)")]
    NegativeValue { field: String, value: f64 },

    #[error("Invalid top N: {0} (must be at least 1)")]
    InvalidTopN(usize),

    #[error("Join suffix must not be empty")]
    EmptyJoinSuffix,

    #[error("Product sheet label '{0}' is used more than once")]
    DuplicateSheetLabel(String),
}

/// Builder for [`DashboardConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct DashboardConfigBuilder {
    data_dir: Option<PathBuf>,
    files: Option<SourceFiles>,
    thresholds: Option<Thresholds>,
    join_suffix: Option<String>,
    top_n: Option<usize>,
    reference_date: Option<NaiveDate>,
}

impl DashboardConfigBuilder {
    /// Set the directory holding the source CSVs.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Replace all source file names.
    pub fn files(mut self, files: SourceFiles) -> Self {
        self.files = Some(files);
        self
    }

    /// Replace all thresholds.
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Set the suffix for colliding right-hand join columns.
    pub fn join_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.join_suffix = Some(suffix.into());
        self
    }

    /// Set the length of top-N rankings.
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    /// Pin the date that recency metrics are measured from.
    pub fn reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `DashboardConfig` or an error if validation fails.
    pub fn build(self) -> Result<DashboardConfig, ConfigValidationError> {
        let defaults = DashboardConfig::default();
        let config = DashboardConfig {
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            files: self.files.unwrap_or(defaults.files),
            thresholds: self.thresholds.unwrap_or(defaults.thresholds),
            join_suffix: self.join_suffix.unwrap_or(defaults.join_suffix),
            top_n: self.top_n.unwrap_or(defaults.top_n),
            reference_date: self.reference_date,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.thresholds.stock_low_max, 10.0);
        assert_eq!(config.thresholds.stock_medium_max, 50.0);
        assert_eq!(config.thresholds.high_return_rate, 90.0);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.join_suffix, "_report");
        assert_eq!(config.files.product_sheets.len(), 2);
        assert!(config.reference_date.is_none());
    }

    #[test]
    fn test_builder_custom_values() {
        let date = NaiveDate::from_ymd_opt(2022, 6, 30).unwrap();
        let config = DashboardConfig::builder()
            .data_dir("fixtures")
            .top_n(5)
            .reference_date(date)
            .build()
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("fixtures"));
        assert_eq!(config.top_n, 5);
        assert_eq!(config.reference_date_or_today(), date);
        assert_eq!(
            config.path_for("new_stock_report.csv"),
            PathBuf::from("fixtures/new_stock_report.csv")
        );
    }

    #[test]
    fn test_validation_overlapping_stock_bands() {
        let thresholds = Thresholds {
            stock_low_max: 60.0,
            ..Thresholds::default()
        };
        let result = DashboardConfig::builder().thresholds(thresholds).build();

        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::StockBands { .. }
        ));
    }

    #[test]
    fn test_validation_zero_top_n() {
        let result = DashboardConfig::builder().top_n(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidTopN(0)
        ));
    }

    #[test]
    fn test_validation_duplicate_sheet_labels() {
        let files = SourceFiles {
            product_sheets: vec![
                ProductSheet::new("2022", "a.csv"),
                ProductSheet::new("2022", "b.csv"),
            ],
            ..SourceFiles::default()
        };
        let result = DashboardConfig::builder().files(files).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::DuplicateSheetLabel(label) if label == "2022"
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = DashboardConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: DashboardConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_from_json() {
        let json = r#"{
            "data_dir": "exports",
            "top_n": 20,
            "reference_date": "2022-06-30",
            "thresholds": { "stock_low_max": 5.0 }
        }"#;

        let config: DashboardConfig =
            serde_json::from_str(json).expect("Should deserialize partial JSON");

        assert_eq!(config.data_dir, PathBuf::from("exports"));
        assert_eq!(config.top_n, 20);
        assert_eq!(config.thresholds.stock_low_max, 5.0);
        assert_eq!(config.thresholds.stock_medium_max, 50.0);
        assert_eq!(config.reference_date, NaiveDate::from_ymd_opt(2022, 6, 30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_rejects_invalid_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        std::fs::write(&path, r#"{ "top_n": 0 }"#).unwrap();

        let err = DashboardConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        std::fs::write(&path, r#"{ "top_n": 3 }"#).unwrap();
        assert_eq!(DashboardConfig::from_json_file(&path).unwrap().top_n, 3);

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            DashboardConfig::from_json_file(&missing),
            Err(DashboardError::FileNotFound(_))
        ));
    }
}
