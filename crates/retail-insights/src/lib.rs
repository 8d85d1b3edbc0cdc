//! Retail Analytics Library
//!
//! Sales, inventory, returns and margin analytics over the CSV exports of a
//! clothing retailer, built on Polars.
//!
//! # Overview
//!
//! - **Loading**: every export is read as text, then typed per table. Bad
//!   numbers and dates become nulls instead of failing the load.
//! - **Joining and grouping**: SKU joins that flag duplicate keys, stable
//!   group-bys, rankings and pivots.
//! - **Classification**: stock levels, reorder priority, overstock actions and
//!   return-rate bands as ordered rule data built from [`Thresholds`].
//! - **Metrics**: return rates, profit margins, holding cost, Pearson
//!   correlation and least-squares trends.
//! - **Sections**: nine dashboard analyses returning serializable reports.
//! - **Schema comparison**: side-by-side column names of every export.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use retail_insights::{Dashboard, DashboardConfig, DashboardFilters, Section};
//!
//! let config = DashboardConfig::builder()
//!     .data_dir("exports")
//!     .top_n(5)
//!     .build()?;
//!
//! let mut filters = DashboardFilters::default();
//! filters.year = Some(2022);
//!
//! let report = Dashboard::new(config)?.run(&filters, &Section::ALL);
//! if let Some(sales) = report.sales.as_ref().and_then(|s| s.ready()) {
//!     println!("Total sales: {:.2}", sales.kpis.total_sales);
//! }
//! println!("{}", retail_insights::report::to_json(&report)?);
//! ```
//!
//! # Failure handling
//!
//! A missing file or column never aborts a run. The section that needs it is
//! reported as skipped with a [`DashboardError`] code and message, and every
//! other section is still built.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod join;
pub mod loader;
pub mod metrics;
pub mod report;
pub mod schema;
pub mod sections;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use aggregate::{Aggregation, PivotTable, Reduction, group_by, pivot, share_within, top_n};
pub use classify::{
    Classifiers, CorrelationStrength, OverstockAction, ReorderPriority, RuleSet, StockLevel,
    StockReturnPattern,
};
pub use config::{
    ConfigValidationError, DashboardConfig, DashboardConfigBuilder, ProductSheet, SourceFiles,
    Thresholds,
};
pub use dashboard::{Dashboard, DashboardReport};
pub use error::{DashboardError, Result as DashboardResult, ResultExt};
pub use filters::{
    DashboardFilters, GeoFilter, GeoMetric, MarginFilter, MetricRange, PerformanceFilter,
    ProductDimension, ProductFilter,
};
pub use join::{JoinOutcome, JoinStats, dedup_first, left_join};
pub use loader::{SourceTables, TableSchema, TableStatus, load_table};
pub use metrics::{TrendLine, pearson, profit_margin, return_rate};
pub use schema::{ColumnSource, compare_columns};
pub use sections::{Section, SectionOutcome};
pub use types::{GroupShare, LabeledCount, LabeledValue};
