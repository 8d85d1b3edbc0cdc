//! Dashboard runs.
//!
//! A [`Dashboard`] loads the source tables once, then builds every selected
//! section against them. A section that fails is recorded as skipped with
//! its error code and message; the other sections still run.
//!
//! # Example
//!
//! ```rust,ignore
//! use retail_insights::{Dashboard, DashboardConfig, DashboardFilters, Section};
//!
//! let config = DashboardConfig::builder().data_dir("exports").build()?;
//! let report = Dashboard::new(config)?.run(&DashboardFilters::default(), &Section::ALL);
//!
//! for (section, message) in report.skipped() {
//!     eprintln!("{}: {}", section, message);
//! }
//! ```

use crate::classify::Classifiers;
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::filters::DashboardFilters;
use crate::loader::{SourceTables, TableStatus};
use crate::sections::{
    Section, SectionContext, SectionOutcome, correlation, customers, geography, inventory,
    margins, performance, products, returns, run_section, sales,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Everything one run produced. Sections that were not requested are absent.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub generated_at: String,
    pub data_dir: PathBuf,
    pub reference_date: NaiveDate,
    pub tables: Vec<TableStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales: Option<SectionOutcome<sales::SalesOverview>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<SectionOutcome<products::ProductAnalysis>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<SectionOutcome<inventory::InventoryReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<SectionOutcome<returns::ReturnsReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<SectionOutcome<correlation::CorrelationReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customers: Option<SectionOutcome<customers::CustomerInsights>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margins: Option<SectionOutcome<margins::MarginReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geography: Option<SectionOutcome<geography::GeographyReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<SectionOutcome<performance::PerformanceReport>>,
}

impl DashboardReport {
    fn empty(config: &DashboardConfig, tables: Vec<TableStatus>) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            data_dir: config.data_dir.clone(),
            reference_date: config.reference_date_or_today(),
            tables,
            sales: None,
            products: None,
            inventory: None,
            returns: None,
            correlation: None,
            customers: None,
            margins: None,
            geography: None,
            performance: None,
        }
    }

    /// Skip message of a requested section, `None` when it is ready or was
    /// not requested.
    pub fn skip_message(&self, section: Section) -> Option<&str> {
        match section {
            Section::Sales => self.sales.as_ref()?.skip_message(),
            Section::Products => self.products.as_ref()?.skip_message(),
            Section::Inventory => self.inventory.as_ref()?.skip_message(),
            Section::Returns => self.returns.as_ref()?.skip_message(),
            Section::Correlation => self.correlation.as_ref()?.skip_message(),
            Section::Customers => self.customers.as_ref()?.skip_message(),
            Section::Margins => self.margins.as_ref()?.skip_message(),
            Section::Geography => self.geography.as_ref()?.skip_message(),
            Section::Performance => self.performance.as_ref()?.skip_message(),
        }
    }

    pub fn was_requested(&self, section: Section) -> bool {
        match section {
            Section::Sales => self.sales.is_some(),
            Section::Products => self.products.is_some(),
            Section::Inventory => self.inventory.is_some(),
            Section::Returns => self.returns.is_some(),
            Section::Correlation => self.correlation.is_some(),
            Section::Customers => self.customers.is_some(),
            Section::Margins => self.margins.is_some(),
            Section::Geography => self.geography.is_some(),
            Section::Performance => self.performance.is_some(),
        }
    }

    /// Requested sections that were skipped, with their messages.
    pub fn skipped(&self) -> Vec<(Section, &str)> {
        Section::ALL
            .iter()
            .filter_map(|s| Some((*s, self.skip_message(*s)?)))
            .collect()
    }
}

/// Runs sections over one set of source tables.
#[derive(Debug)]
pub struct Dashboard {
    config: DashboardConfig,
    sources: SourceTables,
    classifiers: Classifiers,
}

impl Dashboard {
    /// Validate the configuration and load every source file once.
    pub fn new(config: DashboardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| DashboardError::InvalidConfig(e.to_string()))?;
        info!("Loading source tables from {}", config.data_dir.display());
        let sources = SourceTables::load(&config);
        Ok(Self::with_sources(config, sources))
    }

    /// Use already loaded tables.
    pub fn with_sources(config: DashboardConfig, sources: SourceTables) -> Self {
        let classifiers = Classifiers::from_thresholds(&config.thresholds);
        Self {
            config,
            sources,
            classifiers,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceTables {
        &self.sources
    }

    /// Build the requested sections in display order. Duplicates run once.
    pub fn run(&self, filters: &DashboardFilters, sections: &[Section]) -> DashboardReport {
        let ctx = SectionContext {
            sources: &self.sources,
            config: &self.config,
            filters,
            classifiers: &self.classifiers,
        };
        let mut report = DashboardReport::empty(&self.config, self.sources.status());

        for section in Section::ALL.into_iter().filter(|s| sections.contains(s)) {
            match section {
                Section::Sales => report.sales = Some(run_section(section, || sales::build(&ctx))),
                Section::Products => {
                    report.products = Some(run_section(section, || products::build(&ctx)))
                }
                Section::Inventory => {
                    report.inventory = Some(run_section(section, || inventory::build(&ctx)))
                }
                Section::Returns => {
                    report.returns = Some(run_section(section, || returns::build(&ctx)))
                }
                Section::Correlation => {
                    report.correlation = Some(run_section(section, || correlation::build(&ctx)))
                }
                Section::Customers => {
                    report.customers = Some(run_section(section, || customers::build(&ctx)))
                }
                Section::Margins => {
                    report.margins = Some(run_section(section, || margins::build(&ctx)))
                }
                Section::Geography => {
                    report.geography = Some(run_section(section, || geography::build(&ctx)))
                }
                Section::Performance => {
                    report.performance = Some(run_section(section, || performance::build(&ctx)))
                }
            }
        }

        let requested = Section::ALL.iter().filter(|s| report.was_requested(**s)).count();
        info!(
            "Dashboard complete: {} sections, {} skipped",
            requested,
            report.skipped().len()
        );
        report
    }
}
